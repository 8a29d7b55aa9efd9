// Shared portal mocks for integration tests
#![allow(dead_code)]

use calista_client::session::{DATA_PATH, LOGIN_PATH, USER_AGENT};
use calista_client::Config;
use mockito::{Matcher, Mock, ServerGuard};

pub const EMAIL: &str = "vecino@example.com";
pub const PASSWORD: &str = "s3cr3t-pw";

pub const HTML_LATIN1: &str = "text/html;charset=ISO-8859-1";

pub const WELCOME_PAGE: &str = r#"<html><body>
    <h1>Bienvenido a su Oficina Virtual</h1>
    <a href="/GesCon/GestionOficinaVirtual.do?metodo=logOutAbonado">Salir</a>
</body></html>"#;

pub const LOGIN_FORM_PAGE: &str = r#"<html><body>
    <form name="AbonadoForm" method="post" action="/GesCon/GestionOficinaVirtual.do">
        <input type="hidden" name="metodo" value="loginAbonado">
        <input type="text" name="loginName">
        <input type="password" name="password">
    </form>
</body></html>"#;

pub const ERROR_PAGE: &str = "<html><body><p>Error interno del servidor</p></body></html>";

/// Credential rejection page, encoded the way the portal serves it
pub fn login_failed_page() -> Vec<u8> {
    "<html><body><p class=\"error\">Usuario o contraseña incorrectos</p></body></html>"
        .chars()
        .map(|c| c as u8)
        .collect()
}

pub fn test_config(server: &ServerGuard) -> Config {
    Config::new(EMAIL, PASSWORD).with_base_url(server.url())
}

pub fn fixture(name: &str) -> Vec<u8> {
    let path = format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {path}: {e}"))
}

pub async fn mock_login(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", LOGIN_PATH)
        .match_header("user-agent", USER_AGENT)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("metodo".into(), "loginAbonado".into()),
            Matcher::UrlEncoded("loginName".into(), EMAIL.into()),
            Matcher::UrlEncoded("password".into(), PASSWORD.into()),
        ]))
        .with_status(200)
        .with_header("content-type", HTML_LATIN1)
        .with_body(WELCOME_PAGE)
        .expect(hits)
        .create_async()
        .await
}

pub async fn mock_preload(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("GET", DATA_PATH)
        .match_query(Matcher::UrlEncoded(
            "metodo".into(),
            "preCargaLecturasRadio".into(),
        ))
        .with_status(200)
        .with_header("content-type", HTML_LATIN1)
        .with_body("<html><body>Lecturas</body></html>")
        .expect(hits)
        .create_async()
        .await
}

pub async fn mock_logout(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("GET", LOGIN_PATH)
        .match_query(Matcher::UrlEncoded("metodo".into(), "logOutAbonado".into()))
        .with_status(200)
        .with_header("content-type", HTML_LATIN1)
        .with_body(LOGIN_FORM_PAGE)
        .expect(hits)
        .create_async()
        .await
}

/// Query of a report request, dates as `dd/mm/yyyy`
pub fn report_query(start: &str, end: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("d-4360165-e".into(), "2".into()),
        Matcher::UrlEncoded("metodo".into(), "listadoLecturasRadio".into()),
        Matcher::UrlEncoded("fechaDesdeRadio".into(), start.into()),
        Matcher::UrlEncoded("fechaHastaRadio".into(), end.into()),
        Matcher::UrlEncoded("6578706f7274".into(), "1".into()),
    ])
}

/// Any report request
pub fn any_report_query() -> Matcher {
    Matcher::UrlEncoded("metodo".into(), "listadoLecturasRadio".into())
}
