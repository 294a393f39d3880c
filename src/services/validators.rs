use std::sync::OnceLock;

use regex::Regex;

use crate::models::record::{NOT_INFORMED, PRIVATE_PAY};
use crate::models::{FieldKind, NluResult};
use crate::services::text::{digits, fold, words};

const QUESTION_WORDS: &[&str] = &[
    "quais", "qual", "quem", "quando", "como", "onde", "lista", "listar", "opcoes", "opcao",
    "what", "which", "who", "when", "how", "where", "list", "options",
];

const GENDER_SYNONYMS: &[(&str, &str)] = &[
    ("femin", "F"),
    ("mulher", "F"),
    ("mascul", "M"),
    ("homem", "M"),
    ("nao binari", "O"),
    ("outro", "O"),
    ("outra", "O"),
    ("prefiro nao", "O"),
];

const EMAIL_SKIP_PHRASES: &[&str] = &["nao tenho", "nao possuo", "skip", "pular"];

const NO_INSURANCE_PHRASES: &[&str] = &[
    "particular",
    "sem convenio",
    "nao tenho",
    "nao possuo",
];

const YES_WORDS: &[&str] = &["sim", "confirmo", "confirmar", "correto", "certo", "ok", "isso", "yes"];
const NO_WORDS: &[&str] = &["nao", "errado", "corrigir"];

pub const CPF_ERROR: &str =
    "CPF inválido. O CPF deve conter 11 dígitos. Por favor, informe novamente.";
pub const PHONE_ERROR: &str =
    "Telefone inválido. Informe o número com DDD (10 ou 11 dígitos).";

/// Local verdict for `message` as a value of `kind`. `None` means the message
/// could not be settled locally and should go to the remote interpreter.
pub fn validate(kind: FieldKind, message: &str, options: &[String]) -> Option<NluResult> {
    if is_question(message) {
        return Some(NluResult::question());
    }

    match kind {
        FieldKind::Cpf => Some(cpf(message)),
        FieldKind::Gender => gender(message),
        FieldKind::BirthDate => birth_date(message),
        FieldKind::Phone => Some(phone(message)),
        FieldKind::Email => email(message),
        FieldKind::Insurance => insurance(message),
        FieldKind::Confirmation => confirmation(message),
        FieldKind::Specialty | FieldKind::Location | FieldKind::AppointmentType => {
            option(message, options)
        }
        FieldKind::ExamName => option(message, options).or_else(|| free_text(message)),
        FieldKind::PatientName | FieldKind::PreferredTime => free_text(message),
        FieldKind::PreferredDate | FieldKind::Other => None,
    }
}

pub fn is_question(message: &str) -> bool {
    if message.contains('?') {
        return true;
    }
    let words = words(message);
    words.iter().any(|w| QUESTION_WORDS.contains(&w.as_str()))
        || words.windows(2).any(|pair| pair[0] == "o" && pair[1] == "que")
}

pub fn cpf(message: &str) -> NluResult {
    let digits = digits(message);
    if digits.len() == 11 {
        NluResult::accepted(digits)
    } else {
        NluResult::rejected(message, CPF_ERROR)
    }
}

pub fn gender(message: &str) -> Option<NluResult> {
    let folded = fold(message.trim());
    match folded.as_str() {
        "m" => return Some(NluResult::accepted("M")),
        "f" => return Some(NluResult::accepted("F")),
        "o" => return Some(NluResult::accepted("O")),
        _ => {}
    }
    GENDER_SYNONYMS
        .iter()
        .find(|(synonym, _)| folded.contains(synonym))
        .map(|(_, code)| NluResult::accepted(*code))
}

fn birth_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})").expect("birth date pattern is valid")
    })
}

/// Only accepts or defers; an out-of-range date is left to the remote interpreter.
pub fn birth_date(message: &str) -> Option<NluResult> {
    let caps = birth_date_regex().captures(message)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;

    let in_range = (1..=31).contains(&day)
        && (1..=12).contains(&month)
        && (1900..=2024).contains(&year);
    in_range.then(|| NluResult::accepted(format!("{year:04}-{month:02}-{day:02}")))
}

pub fn phone(message: &str) -> NluResult {
    let digits = digits(message);
    if (10..=11).contains(&digits.len()) {
        NluResult::accepted(digits)
    } else {
        NluResult::rejected(message, PHONE_ERROR)
    }
}

pub fn email(message: &str) -> Option<NluResult> {
    let folded = fold(message);
    if EMAIL_SKIP_PHRASES.iter().any(|p| folded.contains(p)) {
        return Some(NluResult::accepted(NOT_INFORMED));
    }

    let candidate = message
        .split_whitespace()
        .find(|w| w.contains('@'))?
        .trim_matches(|c: char| matches!(c, ',' | ';' | '<' | '>' | '(' | ')'))
        .trim_end_matches('.');
    let at = candidate.rfind('@')?;
    let domain = &candidate[at + 1..];
    (at > 0 && domain.contains('.')).then(|| NluResult::accepted(candidate))
}

pub fn insurance(message: &str) -> Option<NluResult> {
    let trimmed = message.trim();
    let folded = fold(trimmed);
    let negative = NO_INSURANCE_PHRASES.iter().any(|p| folded.contains(p))
        || words(trimmed).iter().any(|w| w == "nao" || w == "nenhum");
    if negative {
        return Some(NluResult::accepted(PRIVATE_PAY));
    }
    (trimmed.chars().count() > 2).then(|| NluResult::accepted(trimmed))
}

pub fn confirmation(message: &str) -> Option<NluResult> {
    let words = words(message);
    if words.iter().any(|w| NO_WORDS.contains(&w.as_str())) {
        return Some(NluResult::accepted("não"));
    }
    if words.iter().any(|w| YES_WORDS.contains(&w.as_str())) {
        return Some(NluResult::accepted("sim"));
    }
    None
}

/// First option (in list order) contained in the message, or containing it.
pub fn option(message: &str, options: &[String]) -> Option<NluResult> {
    let folded = fold(message.trim());
    if folded.is_empty() {
        return None;
    }
    let short = folded.chars().count() <= 2;
    options
        .iter()
        .find(|opt| {
            let candidate = fold(opt);
            folded.contains(&candidate) || (!short && candidate.contains(&folded))
        })
        .map(|opt| NluResult::accepted(opt.clone()))
}

pub fn free_text(message: &str) -> Option<NluResult> {
    let trimmed = message.trim();
    (trimmed.chars().count() > 2).then(|| NluResult::accepted(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NluIntent;

    fn specialties() -> Vec<String> {
        ["Cardiologia", "Dermatologia", "Ortopedia"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_questions_short_circuit_every_kind() {
        let kinds = [
            FieldKind::Cpf,
            FieldKind::Phone,
            FieldKind::Specialty,
            FieldKind::PatientName,
            FieldKind::Other,
        ];
        for kind in kinds {
            for msg in ["Quais especialidades vocês têm?", "quais as opções", "onde fica"] {
                let result = validate(kind, msg, &specialties()).unwrap();
                assert_eq!(result.intent, NluIntent::AskQuestion, "{kind:?} / {msg}");
                assert!(result.is_valid);
                assert!(result.value.is_none());
            }
        }
    }

    #[test]
    fn test_plain_answers_are_not_questions() {
        assert!(!is_question("Quero agendar uma consulta"));
        assert!(!is_question("Cardiologia"));
        assert!(is_question("o que vocês atendem"));
    }

    #[test]
    fn test_cpf_digit_count() {
        let ok = cpf("123.456.789-09");
        assert!(ok.is_valid);
        assert_eq!(ok.value.as_deref(), Some("12345678909"));

        for bad in ["123.456.789-0", "123456789012", "abc"] {
            let result = cpf(bad);
            assert!(!result.is_valid);
            assert_eq!(result.value.as_deref(), Some(bad));
            assert!(result.error.is_some());
        }
    }

    #[test]
    fn test_gender_synonyms() {
        assert_eq!(gender("Feminino").unwrap().value.as_deref(), Some("F"));
        assert_eq!(gender("sou homem").unwrap().value.as_deref(), Some("M"));
        assert_eq!(gender("m").unwrap().value.as_deref(), Some("M"));
        assert_eq!(gender("Não binário").unwrap().value.as_deref(), Some("O"));
        assert!(gender("talvez").is_none());
    }

    #[test]
    fn test_birth_date_accepts_or_defers() {
        let result = birth_date("nasci em 5/3/1990").unwrap();
        assert_eq!(result.value.as_deref(), Some("1990-03-05"));
        assert_eq!(
            birth_date("31.12.2000").unwrap().value.as_deref(),
            Some("2000-12-31")
        );
        assert!(birth_date("32/01/1990").is_none());
        assert!(birth_date("10/10/1850").is_none());
        assert!(birth_date("10/10/2030").is_none());
        assert!(birth_date("ontem").is_none());
    }

    #[test]
    fn test_phone_is_never_deferred() {
        assert_eq!(phone("(11) 98765-4321").value.as_deref(), Some("11987654321"));
        assert!(phone("(61) 3333-4444").is_valid);
        let bad = phone("98765");
        assert!(!bad.is_valid);
        assert_eq!(bad.error.as_deref(), Some(PHONE_ERROR));
    }

    #[test]
    fn test_email_skip_and_shape() {
        assert_eq!(email("não tenho").unwrap().value.as_deref(), Some(NOT_INFORMED));
        assert_eq!(email("pular").unwrap().value.as_deref(), Some(NOT_INFORMED));
        assert_eq!(
            email("meu email é ana@exemplo.com.br").unwrap().value.as_deref(),
            Some("ana@exemplo.com.br")
        );
        assert!(email("ana@exemplo").is_none());
        assert!(email("ana arroba exemplo").is_none());
    }

    #[test]
    fn test_insurance_negatives_and_names() {
        for negative in ["Particular", "sem convênio", "não tenho", "não"] {
            assert_eq!(
                insurance(negative).unwrap().value.as_deref(),
                Some(PRIVATE_PAY),
                "{negative}"
            );
        }
        assert_eq!(insurance("Unimed").unwrap().value.as_deref(), Some("Unimed"));
        assert!(insurance("ab").is_none());
    }

    #[test]
    fn test_option_matching_both_directions() {
        let opts = specialties();
        assert_eq!(
            validate(FieldKind::Specialty, "quero cardiologia", &opts)
                .unwrap()
                .value
                .as_deref(),
            Some("Cardiologia")
        );
        assert_eq!(
            validate(FieldKind::Specialty, "orto", &opts).unwrap().value.as_deref(),
            Some("Ortopedia")
        );
        assert!(validate(FieldKind::Specialty, "astrologia", &opts).is_none());
        assert!(validate(FieldKind::Specialty, "cardiologia", &[]).is_none());
    }

    #[test]
    fn test_exam_name_falls_back_to_free_text() {
        let exams = vec!["Hemograma Completo".to_string()];
        assert_eq!(
            validate(FieldKind::ExamName, "hemograma", &exams).unwrap().value.as_deref(),
            Some("Hemograma Completo")
        );
        assert_eq!(
            validate(FieldKind::ExamName, "Glicemia", &exams).unwrap().value.as_deref(),
            Some("Glicemia")
        );
    }

    #[test]
    fn test_free_text_and_uncovered_kinds() {
        assert_eq!(
            validate(FieldKind::PatientName, "  Maria Souza ", &[]).unwrap().value.as_deref(),
            Some("Maria Souza")
        );
        assert!(validate(FieldKind::PatientName, "ok", &[]).is_none());
        assert!(validate(FieldKind::PreferredDate, "amanhã", &[]).is_none());
        assert!(validate(FieldKind::Other, "qualquer coisa", &[]).is_none());
    }

    #[test]
    fn test_confirmation_words() {
        assert_eq!(confirmation("Sim, está certo").unwrap().value.as_deref(), Some("sim"));
        assert_eq!(confirmation("não, quero corrigir").unwrap().value.as_deref(), Some("não"));
        assert!(confirmation("talvez").is_none());
    }
}
