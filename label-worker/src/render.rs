//! Label template resolution and rendering
//!
//! Stored `.prn` templates carry the static layout for a color; the
//! renderer splices the per-unit fields (barcode, date, ticket id,
//! machine and operator) into a copy of the template right before its
//! closing `^XZ`.

use crate::job::{LabelFormat, PrintJob};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use zpl_printer::{inject_before_end, ZplBuilder};

/// Operator names longer than this are cut to fit the label
pub const MAX_OPERATOR_CHARS: usize = 15;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No template on disk for '{reference}' ({format})")]
    TemplateMissing {
        reference: String,
        format: LabelFormat,
    },

    #[error("Template read failed: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Renders print-ready ZPL for one label unit
#[derive(Debug, Clone)]
pub struct LabelRenderer {
    template_dir: PathBuf,
    station_id: String,
    timezone: Tz,
}

impl LabelRenderer {
    pub fn new(template_dir: impl Into<PathBuf>, station_id: impl Into<String>, timezone: Tz) -> Self {
        Self {
            template_dir: template_dir.into(),
            station_id: station_id.into(),
            timezone,
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    /// Color name shared by both formats of a reference
    ///
    /// Large references historically carry a `_GRANDE` suffix; the bare
    /// name is what barcodes and the catalog use.
    pub fn base_reference(reference: &str) -> &str {
        reference.strip_suffix("_GRANDE").unwrap_or(reference)
    }

    /// Template file names to try, most specific first
    pub fn candidates(reference: &str, format: LabelFormat) -> Vec<String> {
        let base = Self::base_reference(reference);
        let mut names = Vec::with_capacity(3);
        let raw = match format {
            LabelFormat::Large => vec![
                format!("{}_GRANDE.prn", base),
                format!("{}.prn", base),
                format!("{}.prn", reference),
            ],
            LabelFormat::Small => vec![format!("{}.prn", base), format!("{}.prn", reference)],
        };
        for name in raw {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Find the template file for a reference, or report it missing
    pub fn resolve_template(&self, reference: &str, format: LabelFormat) -> RenderResult<PathBuf> {
        for name in Self::candidates(reference, format) {
            let path = self.template_dir.join(&name);
            if path.exists() {
                debug!(reference, %format, template = %path.display(), "Template resolved");
                return Ok(path);
            }
        }
        Err(RenderError::TemplateMissing {
            reference: reference.to_string(),
            format,
        })
    }

    /// Barcode payload for one unit: station, material, color, ticket
    pub fn barcode_content(&self, job: &PrintJob, reference: &str, ticket: u64) -> String {
        format!(
            "{}-{}-{}-{:010}",
            self.station_id,
            job.material(),
            Self::base_reference(reference),
            ticket
        )
    }

    /// Render the full ZPL payload for one unit of a job
    pub fn render(
        &self,
        job: &PrintJob,
        format: LabelFormat,
        ticket: u64,
        at: DateTime<Utc>,
    ) -> RenderResult<Vec<u8>> {
        let reference = job.label_ref(format).unwrap_or_default();
        let path = self.resolve_template(reference, format)?;
        let template = std::fs::read_to_string(&path).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;

        let barcode = self.barcode_content(job, reference, ticket);
        let stamp = at
            .with_timezone(&self.timezone)
            .format("%d/%m/%Y %H:%M:%S")
            .to_string();
        let operator: String = job.operator().chars().take(MAX_OPERATOR_CHARS).collect();

        let mut fields = ZplBuilder::new();
        fields
            .field_origin(60, 60)
            .bar_defaults(0.5, 2.0, 150)
            .code128(100, true)
            .field_data(&barcode);
        fields
            .field_origin(30, 300)
            .font(30, 30)
            .field_data(&format!("Fecha: {}", stamp));
        fields
            .field_origin(30, 340)
            .font(30, 30)
            .field_data(&format!("Etiq. ID: {:010}", ticket));
        fields
            .field_origin(30, 380)
            .font(25, 25)
            .field_data(&format!("Máq: {:02} | Op: {}", job.machine_id(), operator));

        Ok(inject_before_end(&template, &fields.build()).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const TEMPLATE: &str = "^XA\n^FO10,10^A0N,20,20^FDSTATIC^FS\n^XZ\n";

    fn renderer(dir: &TempDir) -> LabelRenderer {
        LabelRenderer::new(
            dir.path(),
            "02",
            chrono_tz::America::Argentina::Buenos_Aires,
        )
    }

    fn job() -> PrintJob {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "maquina_id": 7,
            "tipo_material": "PLA",
            "etiqueta_chica": "AZUL",
            "etiqueta_grande": "AZUL_GRANDE",
            "operador": "Maria Fernanda Gutierrez",
            "cantidad_chicas": 2,
            "cantidad_grandes": 1,
            "estado": "pendiente"
        }))
        .unwrap()
    }

    #[test]
    fn test_base_reference_strips_suffix() {
        assert_eq!(LabelRenderer::base_reference("AZUL_GRANDE"), "AZUL");
        assert_eq!(LabelRenderer::base_reference("AZUL"), "AZUL");
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(
            LabelRenderer::candidates("AZUL_GRANDE", LabelFormat::Large),
            vec!["AZUL_GRANDE.prn", "AZUL.prn"]
        );
        // A large ref without the suffix still tries the suffixed name first
        assert_eq!(
            LabelRenderer::candidates("AZUL", LabelFormat::Large),
            vec!["AZUL_GRANDE.prn", "AZUL.prn"]
        );
        assert_eq!(
            LabelRenderer::candidates("AZUL", LabelFormat::Small),
            vec!["AZUL.prn"]
        );
        assert_eq!(
            LabelRenderer::candidates("AZUL_GRANDE", LabelFormat::Small),
            vec!["AZUL.prn", "AZUL_GRANDE.prn"]
        );
    }

    #[test]
    fn test_resolve_prefers_specific_template() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AZUL.prn"), TEMPLATE).unwrap();
        std::fs::write(dir.path().join("AZUL_GRANDE.prn"), TEMPLATE).unwrap();

        let r = renderer(&dir);
        let path = r.resolve_template("AZUL_GRANDE", LabelFormat::Large).unwrap();
        assert!(path.ends_with("AZUL_GRANDE.prn"));

        let path = r.resolve_template("AZUL", LabelFormat::Small).unwrap();
        assert!(path.ends_with("AZUL.prn"));
    }

    #[test]
    fn test_resolve_falls_back_to_base() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AZUL.prn"), TEMPLATE).unwrap();

        let r = renderer(&dir);
        let path = r.resolve_template("AZUL_GRANDE", LabelFormat::Large).unwrap();
        assert!(path.ends_with("AZUL.prn"));
    }

    #[test]
    fn test_resolve_missing_template() {
        let dir = TempDir::new().unwrap();
        let r = renderer(&dir);

        let err = r.resolve_template("FUCSIA", LabelFormat::Small).unwrap_err();
        match err {
            RenderError::TemplateMissing { reference, format } => {
                assert_eq!(reference, "FUCSIA");
                assert_eq!(format, LabelFormat::Small);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_barcode_content() {
        let dir = TempDir::new().unwrap();
        let r = renderer(&dir);

        assert_eq!(
            r.barcode_content(&job(), "AZUL_GRANDE", 42),
            "02-PLA-AZUL-0000000042"
        );
    }

    #[test]
    fn test_render_injects_dynamic_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("AZUL.prn"), TEMPLATE).unwrap();

        let r = renderer(&dir);
        // 12:00 UTC is 09:00 in Buenos Aires
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let zpl = r.render(&job(), LabelFormat::Small, 1, at).unwrap();
        let zpl = String::from_utf8(zpl).unwrap();

        assert!(zpl.contains("^FDSTATIC^FS"));
        assert!(zpl.contains("^FO60,60^BY0.5,2,150^BCN,100,Y,N,N^FD02-PLA-AZUL-0000000001^FS"));
        assert!(zpl.contains("^FDFecha: 05/01/2026 09:00:00^FS"));
        assert!(zpl.contains("^FDEtiq. ID: 0000000001^FS"));
        // Operator cut to 15 chars, machine zero-padded
        assert!(zpl.contains("^FDMáq: 07 | Op: Maria Fernanda ^FS"));
        // Dynamic fields sit inside the format, before the closing marker
        assert!(zpl.rfind("^FDSTATIC").unwrap() < zpl.find("^FO60,60").unwrap());
        assert!(zpl.find("^FO60,60").unwrap() < zpl.rfind("^XZ").unwrap());
    }

    #[test]
    fn test_render_missing_template_is_error() {
        let dir = TempDir::new().unwrap();
        let r = renderer(&dir);

        let err = r
            .render(&job(), LabelFormat::Small, 1, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateMissing { .. }));
    }
}
