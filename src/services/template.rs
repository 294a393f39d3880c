#[derive(Debug, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),
}

/// Substitutes every `{name}` in `template` with `lookup(name)`.
///
/// `lookup` returns `None` for names it does not know about; that is an error,
/// not an empty substitution.
pub fn render(
    template: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or(TemplateError::Unclosed(offset + start))?;
        let name = &after[..end];
        let value =
            lookup(name).ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        out.push_str(&value);

        let consumed = start + 1 + end + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "paciente.nome" => Some("Maria".to_string()),
            "vazio" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn test_render_substitutes_known_names() {
        assert_eq!(
            render("Olá {paciente.nome}!{vazio} Tudo bem?", lookup).unwrap(),
            "Olá Maria! Tudo bem?"
        );
        assert_eq!(render("sem marcadores", lookup).unwrap(), "sem marcadores");
    }

    #[test]
    fn test_render_reports_unknown_and_unclosed() {
        assert_eq!(
            render("Oi {quem}", lookup),
            Err(TemplateError::UnknownPlaceholder("quem".to_string()))
        );
        assert_eq!(render("Oi {paciente.nome", lookup), Err(TemplateError::Unclosed(3)));
    }
}
