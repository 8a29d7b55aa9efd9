// Shared text and number helpers for portal pages and report cells

/// Fold a Spanish label to lower-case ASCII
///
/// Accented vowels lose their accent, `ñ` becomes `n` and the ordinal markers
/// `º`/`ª` and the degree sign are dropped. Everything else is kept as is.
///
/// # Examples
///
/// ```
/// use calista_client::utils::fold_ascii;
///
/// assert_eq!(fold_ascii("Calefacción"), "calefaccion");
/// assert_eq!(fold_ascii("Nº Serie"), "n serie");
/// assert_eq!(fold_ascii("Contraseña"), "contrasena");
/// ```
pub fn fold_ascii(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    for c in value.chars().flat_map(char::to_lowercase) {
        match c {
            'á' | 'à' | 'â' | 'ä' => folded.push('a'),
            'é' | 'è' | 'ê' | 'ë' => folded.push('e'),
            'í' | 'ì' | 'î' | 'ï' => folded.push('i'),
            'ó' | 'ò' | 'ô' | 'ö' => folded.push('o'),
            'ú' | 'ù' | 'û' | 'ü' => folded.push('u'),
            'ñ' => folded.push('n'),
            'ç' => folded.push('c'),
            'º' | 'ª' | '°' => {}
            other => folded.push(other),
        }
    }
    folded
}

/// Normalise a report header cell for layout detection
///
/// # Examples
///
/// ```
/// use calista_client::utils::normalize_header;
///
/// assert_eq!(normalize_header("Nº Serie"), "n_serie");
/// assert_eq!(normalize_header("  Lectura actual "), "lectura_actual");
/// assert_eq!(normalize_header("Ubicación"), "ubicacion");
/// ```
pub fn normalize_header(value: &str) -> String {
    fold_ascii(value)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Lookup key for a location label: folded, trimmed, single-spaced
pub fn location_key(value: &str) -> String {
    fold_ascii(value).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a reading written with either locale's separators
///
/// Returns `None` for empty cells and the `-` placeholder the portal uses,
/// `Some(Err)` when the text is not a finite number.
///
/// # Examples
///
/// ```
/// use calista_client::utils::parse_decimal;
///
/// assert_eq!(parse_decimal("20,5"), Some(Ok(20.5)));
/// assert_eq!(parse_decimal("1.234,5"), Some(Ok(1234.5)));
/// assert_eq!(parse_decimal("1,234.5"), Some(Ok(1234.5)));
/// assert_eq!(parse_decimal(" - "), None);
/// ```
pub fn parse_decimal(value: &str) -> Option<Result<f64, String>> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }

    let cleaned: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // 1.234,5: dots group thousands, comma is the decimal mark
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    Some(match normalized.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(format!("'{trimmed}' is not a number")),
    })
}
