// Content sniffing for portal responses
//
// The portal labels spreadsheets as text/html and answers expired sessions
// with a 200 login page, so the declared content type is only a hint.

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::utils::fold_ascii;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

const LOGIN_MARKERS: [&str; 4] = [
    "metodo=loginabonado",
    "sesion caducada",
    "sesion ha caducado",
    "sesion ha expirado",
];

const LOGIN_FAILURE_MARKERS: [&str; 3] = [
    "usuario o contrasena incorrectos",
    "contrasena incorrecta",
    "usuario incorrecto",
];

/// True format of a response body, independent of its Content-Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadKind {
    /// BIFF8 workbook in an OLE compound file (.xls)
    LegacyBinarySpreadsheet,
    /// Office Open XML workbook (.xlsx)
    ModernZippedSpreadsheet,
    PlainText,
    Unrecognized,
}

/// Classify a raw body before anything tries to decode it
pub fn classify(bytes: &[u8], declared_content_type: Option<&str>) -> PayloadKind {
    let kind = if bytes.is_empty() {
        PayloadKind::Unrecognized
    } else if bytes.starts_with(&OLE_MAGIC) {
        PayloadKind::LegacyBinarySpreadsheet
    } else if bytes.starts_with(&ZIP_MAGIC) {
        PayloadKind::ModernZippedSpreadsheet
    } else if decode_text(bytes, declared_content_type).is_some() {
        PayloadKind::PlainText
    } else {
        PayloadKind::Unrecognized
    };

    debug!(
        "Classified {} bytes (declared {:?}) as {:?}",
        bytes.len(),
        declared_content_type,
        kind
    );
    kind
}

/// Decode a text body: UTF-8 first, Latin-1 when the server declared text
///
/// Returns `None` for bodies with control bytes other than whitespace.
pub fn decode_text(bytes: &[u8], declared_content_type: Option<&str>) -> Option<String> {
    if bytes.iter().any(|b| is_binary_control(*b)) {
        return None;
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }

    let declared_text = declared_content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("text/"))
        .unwrap_or(false);
    if declared_text {
        // ISO-8859-1 maps every byte to the code point of the same value
        return Some(bytes.iter().map(|&b| char::from(b)).collect());
    }

    None
}

fn is_binary_control(byte: u8) -> bool {
    byte < 0x20 && !matches!(byte, b'\t' | b'\n' | b'\r' | 0x0C)
}

/// Whether a decoded page is the portal's login form
///
/// The portal answers requests on an expired session with this page and a
/// 200 status.
pub fn is_login_page(text: &str) -> bool {
    let folded = fold_ascii(text);
    if LOGIN_MARKERS.iter().any(|marker| folded.contains(marker)) {
        return true;
    }

    has_login_form(text).unwrap_or(false)
}

fn has_login_form(text: &str) -> Option<bool> {
    let document = Html::parse_document(text);
    let form_selector = Selector::parse("form").ok()?;
    let input_selector = Selector::parse("input[name]").ok()?;

    Some(document.select(&form_selector).any(|form| {
        let posts_to_login = form
            .value()
            .attr("action")
            .map(|action| action.contains("GestionOficinaVirtual.do"))
            .unwrap_or(false);

        posts_to_login
            && form.select(&input_selector).any(|input| {
                matches!(input.value().attr("name"), Some("loginName") | Some("password"))
            })
    }))
}

/// Whether a decoded page rejects the submitted credentials
pub fn is_login_failure(text: &str) -> bool {
    let folded = fold_ascii(text);
    LOGIN_FAILURE_MARKERS
        .iter()
        .any(|marker| folded.contains(marker))
}
