//! Local HTTP server publishing in-memory ZIP archives

use axum::{extract::Path, http::StatusCode, routing::get, Extension, Router};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use zip::write::SimpleFileOptions;

pub const HEADER: &str =
    "\"nomprenom\";\"sexe\";\"datenaiss\";\"lieunaiss\";\"commnaiss\";\"paysnaiss\";\"datedeces\";\"lieudeces\";\"actedeces\"";

/// One valid extract line; `act` makes the natural key unique
pub fn data_row(surname: &str, act: &str) -> String {
    format!(
        "\"{}*JEAN PIERRE/\";\"1\";\"19400312\";\"75056\";\"PARIS\";\"\";\"20240105\";\"75112\";\"{}\"",
        surname, act
    )
}

/// Line rejected by the codec for its sex code
pub fn invalid_row(surname: &str, act: &str) -> String {
    data_row(surname, act).replacen("\";\"1\";\"", "\";\"3\";\"", 1)
}

/// Header plus the given lines
pub fn extract_csv(lines: &[String]) -> String {
    let mut content = String::from(HEADER);
    for line in lines {
        content.push('\n');
        content.push_str(line);
    }
    content.push('\n');
    content
}

/// Build a ZIP archive from (entry name, content) pairs
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

type Archives = Arc<HashMap<String, Vec<u8>>>;

async fn serve_archive(
    Extension(archives): Extension<Archives>,
    Path(name): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    archives.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)
}

/// Server bound to an ephemeral port; unknown names answer 404
pub struct ArchiveServer {
    pub addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ArchiveServer {
    pub async fn start(archives: Vec<(&str, Vec<u8>)>) -> Self {
        let archives: Archives = Arc::new(
            archives
                .into_iter()
                .map(|(name, bytes)| (name.to_string(), bytes))
                .collect(),
        );

        let app = Router::new()
            .route("/fichier/:name", get(serve_archive))
            .layer(Extension(archives));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, handle }
    }

    /// Trusted prefix covering every archive of this server
    pub fn prefix(&self) -> String {
        format!("http://{}/fichier/", self.addr)
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }
}

impl Drop for ArchiveServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
