//! Wire model of the remote print queue

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued print job
///
/// Wire values are the Spanish column values of the backing table. The
/// worker only ever picks up `Pending` rows and only ever writes the two
/// terminal states; terminal rows are never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "impresa")]
    Printed,
    #[serde(rename = "error")]
    Error,
}

impl JobState {
    /// Wire value as stored in the queue table
    pub fn as_wire(&self) -> &'static str {
        match self {
            JobState::Pending => "pendiente",
            JobState::Printed => "impresa",
            JobState::Error => "error",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// The two label stocks a job can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    Small,
    Large,
}

impl LabelFormat {
    /// Processing order within a job: small first, then large
    pub const ALL: [LabelFormat; 2] = [LabelFormat::Small, LabelFormat::Large];

    /// Journal/notification name ("chica" / "grande")
    pub fn as_wire(&self) -> &'static str {
        match self {
            LabelFormat::Small => "chica",
            LabelFormat::Large => "grande",
        }
    }
}

impl std::fmt::Display for LabelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One row of the remote queue table (`impresiones`)
///
/// Operators leave plenty of columns blank, so most fields arrive as
/// nulls. Accessors default them; a sparse row must never sink a whole
/// fetch batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    /// Source-assigned identifier, opaque to the worker
    pub id: i64,
    /// Machine the request came from (not the machine printing)
    #[serde(rename = "maquina_id")]
    pub machine_id: Option<i64>,
    #[serde(rename = "tipo_material")]
    pub material: Option<String>,
    #[serde(rename = "etiqueta_chica")]
    pub small_ref: Option<String>,
    #[serde(rename = "etiqueta_grande")]
    pub large_ref: Option<String>,
    #[serde(rename = "operador")]
    pub operator: Option<String>,
    #[serde(rename = "cantidad_chicas")]
    pub small_qty: Option<u32>,
    #[serde(rename = "cantidad_grandes")]
    pub large_qty: Option<u32>,
    #[serde(rename = "estado")]
    pub state: JobState,
}

impl PrintJob {
    /// Material name, `DESCONOCIDO` when the row has none
    pub fn material(&self) -> &str {
        self.material.as_deref().unwrap_or("DESCONOCIDO")
    }

    /// Operator display name, `Desconocido` when the row has none
    pub fn operator(&self) -> &str {
        self.operator.as_deref().unwrap_or("Desconocido")
    }

    /// Requesting machine id, 0 when the row has none
    pub fn machine_id(&self) -> i64 {
        self.machine_id.unwrap_or(0)
    }

    /// Units requested for a format
    pub fn quantity(&self, format: LabelFormat) -> u32 {
        match format {
            LabelFormat::Small => self.small_qty.unwrap_or(0),
            LabelFormat::Large => self.large_qty.unwrap_or(0),
        }
    }

    /// Template reference for a format, if the row carries a usable one
    pub fn label_ref(&self, format: LabelFormat) -> Option<&str> {
        let reference = match format {
            LabelFormat::Small => self.small_ref.as_deref(),
            LabelFormat::Large => self.large_ref.as_deref(),
        };
        reference.filter(|r| !r.trim().is_empty())
    }

    /// Whether this job asks for any printable units of a format
    ///
    /// A quantity without a reference (or the other way round) does not
    /// participate and counts as vacuously complete.
    pub fn participates(&self, format: LabelFormat) -> bool {
        self.quantity(format) > 0 && self.label_ref(format).is_some()
    }
}
