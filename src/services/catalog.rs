use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::db::queries;
use crate::models::{CollectedData, FieldKind, Location};

/// Source of the specialties, locations and exams offered to patients.
///
/// Implementations never fail: a broken backend degrades to a fallback list.
pub trait MedicalCatalog: Send + Sync {
    fn list_specialties(&self) -> Vec<String>;
    fn list_locations(&self, specialty: Option<&str>) -> Vec<Location>;
    fn list_exams(&self) -> Vec<String>;
    fn locations_for_exam(&self, exam: &str) -> Vec<Location>;
}

const SPECIALTIES: &[&str] = &[
    "Cardiologia",
    "Dermatologia",
    "Ortopedia",
    "Ginecologia",
    "Pediatria",
    "Neurologia",
];

const LOCATIONS: &[&str] = &[
    "Hospital São Paulo",
    "Clínica CardioVida",
    "Centro Médico Central",
    "Clínica DermaBela",
    "Instituto de Dermatologia",
    "Ortopedia Especializada",
    "Clínica da Mulher",
    "Centro Ginecológico",
    "Clínica Infantil",
    "Instituto Neurológico",
];

// Indexes into LOCATIONS.
const SPECIALTY_LOCATIONS: &[(&str, &[usize])] = &[
    ("Cardiologia", &[0, 1, 2]),
    ("Dermatologia", &[0, 3, 4]),
    ("Ortopedia", &[1, 2, 5]),
    ("Ginecologia", &[0, 6, 7]),
    ("Pediatria", &[0, 2, 8]),
    ("Neurologia", &[0, 2, 9]),
];

const EXAMS: &[&str] = &[
    "Hemograma Completo",
    "Raio-X Tórax",
    "Ultrassonografia Abdominal",
    "Eletrocardiograma",
    "Ecocardiograma",
    "Tomografia Computadorizada",
    "Ressonância Magnética",
    "Mamografia",
    "Colonoscopia",
    "Endoscopia Digestiva",
    "Densitometria Óssea",
    "Teste Ergométrico",
];

pub const APPOINTMENT_TYPES: &[&str] = &["Consulta", "Exame"];

/// Fixed in-process catalog, also the last resort of [`SqliteCatalog`].
pub struct StaticCatalog;

impl StaticCatalog {
    fn location(index: usize) -> Location {
        Location {
            id: index as i64 + 1,
            name: LOCATIONS[index].to_string(),
            address: None,
        }
    }

    fn all_locations() -> Vec<Location> {
        (0..LOCATIONS.len()).map(Self::location).collect()
    }
}

impl MedicalCatalog for StaticCatalog {
    fn list_specialties(&self) -> Vec<String> {
        SPECIALTIES.iter().map(|s| s.to_string()).collect()
    }

    fn list_locations(&self, specialty: Option<&str>) -> Vec<Location> {
        let Some(specialty) = specialty else {
            return Self::all_locations();
        };
        SPECIALTY_LOCATIONS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(specialty.trim()))
            .map(|(_, indexes)| indexes.iter().map(|&i| Self::location(i)).collect())
            .unwrap_or_else(Self::all_locations)
    }

    fn list_exams(&self) -> Vec<String> {
        EXAMS.iter().map(|s| s.to_string()).collect()
    }

    fn locations_for_exam(&self, _exam: &str) -> Vec<Location> {
        Self::all_locations()
    }
}

/// Catalog backed by the seeded catalog tables.
pub struct SqliteCatalog {
    db: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn query<T>(
        &self,
        what: &str,
        f: impl FnOnce(&Connection) -> anyhow::Result<Vec<T>>,
    ) -> Option<Vec<T>> {
        let result = match self.db.lock() {
            Ok(conn) => f(&*conn),
            Err(_) => Err(anyhow::anyhow!("database mutex poisoned")),
        };
        match result {
            Ok(rows) if !rows.is_empty() => Some(rows),
            Ok(_) => {
                tracing::debug!(what, "catalog query returned nothing");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, what, "catalog query failed, using fallback");
                None
            }
        }
    }
}

impl MedicalCatalog for SqliteCatalog {
    fn list_specialties(&self) -> Vec<String> {
        self.query("specialties", queries::list_specialties)
            .unwrap_or_else(|| StaticCatalog.list_specialties())
    }

    fn list_locations(&self, specialty: Option<&str>) -> Vec<Location> {
        let filtered = specialty.and_then(|s| {
            self.query("locations by specialty", |conn| {
                queries::list_locations_for_specialty(conn, s)
            })
        });
        filtered
            .or_else(|| self.query("locations", queries::list_locations))
            .unwrap_or_else(|| StaticCatalog.list_locations(specialty))
    }

    fn list_exams(&self) -> Vec<String> {
        self.query("exams", queries::list_exams)
            .unwrap_or_else(|| StaticCatalog.list_exams())
    }

    fn locations_for_exam(&self, exam: &str) -> Vec<Location> {
        self.query("locations by exam", |conn| {
            queries::list_locations_for_exam(conn, exam)
        })
        .or_else(|| self.query("locations", queries::list_locations))
        .unwrap_or_else(|| StaticCatalog.locations_for_exam(exam))
    }
}

/// Locations that fit what the patient picked so far: by exam when booking an
/// exam, by specialty otherwise.
pub fn locations_for(catalog: &dyn MedicalCatalog, collected: &CollectedData) -> Vec<Location> {
    let is_exam = collected
        .get("agendamento_info", "tipo")
        .is_some_and(|t| t.eq_ignore_ascii_case("exame"));
    match collected.get("agendamento_info", "nome_exame") {
        Some(exam) if is_exam => catalog.locations_for_exam(exam),
        _ => catalog.list_locations(collected.get("agendamento_info", "especialidade")),
    }
}

/// Valid answers for a field, used both to validate input and to list choices.
pub fn options_for(
    kind: FieldKind,
    catalog: &dyn MedicalCatalog,
    collected: &CollectedData,
) -> Vec<String> {
    match kind {
        FieldKind::AppointmentType => APPOINTMENT_TYPES.iter().map(|s| s.to_string()).collect(),
        FieldKind::Specialty => catalog.list_specialties(),
        FieldKind::ExamName => catalog.list_exams(),
        FieldKind::Location => locations_for(catalog, collected)
            .into_iter()
            .map(|l| l.name)
            .collect(),
        _ => Vec::new(),
    }
}
