use std::path::PathBuf;

use reqwest::StatusCode;
use url::Url;

use crate::{Error, Result};

/// Fetches the raw bytes of a flag file.
pub trait FlagReader {
    fn read(&self) -> Result<Vec<u8>>;
}

/// Reads flags from the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileReader {
    path: PathBuf,
}

impl LocalFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalFileReader { path: path.into() }
    }
}

impl FlagReader for LocalFileReader {
    fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Reads flags from an `http(s)://` URL, optionally sending a bearer token.
///
/// A 401 or 403 response is reported as [`Error::Unauthorized`].
pub struct HttpReader {
    client: reqwest::blocking::Client,
    url: Url,
    token: Option<String>,
}

impl HttpReader {
    pub fn new(url: Url, token: Option<String>) -> Self {
        HttpReader {
            client: reqwest::blocking::Client::new(),
            url,
            token,
        }
    }
}

impl FlagReader for HttpReader {
    fn read(&self) -> Result<Vec<u8>> {
        let mut request = self.client.get(self.url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        match response.status() {
            StatusCode::OK => Ok(response.bytes()?.to_vec()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
            status => Err(Error::UnexpectedStatus(status.as_u16())),
        }
    }
}

/// Pick a reader for `location`: `http://` and `https://` URLs are fetched over the network,
/// `file://` URLs and plain paths are read from disk.
pub(crate) fn from_location(
    location: &str,
    token: Option<String>,
) -> Result<Box<dyn FlagReader + Send>> {
    if !location.contains("://") {
        return Ok(Box::new(LocalFileReader::new(location)));
    }

    let url = Url::parse(location).map_err(Error::InvalidLocation)?;
    match url.scheme() {
        "http" | "https" => Ok(Box::new(HttpReader::new(url, token))),
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| Error::UnsupportedLocation(location.to_owned()))?;
            Ok(Box::new(LocalFileReader::new(path)))
        }
        _ => Err(Error::UnsupportedLocation(location.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread::JoinHandle,
    };

    use url::Url;

    use crate::Error;

    use super::{from_location, FlagReader, HttpReader, LocalFileReader};

    /// Serve one canned HTTP response and hand back the request head.
    fn serve_once(status_line: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!(
            "http://{}/flags.yaml",
            listener.local_addr().unwrap()
        ))
        .unwrap();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = String::new();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }
            write!(
                stream,
                "{}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            )
            .unwrap();
            head
        });

        (url, handle)
    }

    #[test]
    fn reads_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"flag: { variants: { default: true } }")
            .unwrap();

        let reader = LocalFileReader::new(file.path());
        assert_eq!(
            reader.read().unwrap(),
            b"flag: { variants: { default: true } }"
        );
    }

    #[test]
    fn missing_local_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = LocalFileReader::new(dir.path().join("missing.yaml"));
        assert!(matches!(reader.read(), Err(Error::Io(_))));
    }

    #[test]
    fn http_sends_bearer_token() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", "flag: {}");
        let reader = HttpReader::new(url, Some("secret".to_owned()));

        assert_eq!(reader.read().unwrap(), b"flag: {}");
        let head = server.join().unwrap().to_ascii_lowercase();
        assert!(head.contains("authorization: bearer secret"), "{}", head);
    }

    #[test]
    fn http_forbidden_is_unauthorized() {
        let (url, server) = serve_once("HTTP/1.1 403 Forbidden", "");
        let reader = HttpReader::new(url, None);

        assert!(matches!(reader.read(), Err(Error::Unauthorized)));
        server.join().unwrap();
    }

    #[test]
    fn http_other_status_is_reported() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "");
        let reader = HttpReader::new(url, None);

        assert!(matches!(reader.read(), Err(Error::UnexpectedStatus(503))));
        server.join().unwrap();
    }

    #[test]
    fn location_selects_reader() {
        assert!(from_location("tests/data/flags.yaml", None).is_ok());
        assert!(from_location("https://example.com/flags.yaml", None).is_ok());
        assert!(matches!(
            from_location("ftp://example.com/flags.yaml", None),
            Err(Error::UnsupportedLocation(location)) if location == "ftp://example.com/flags.yaml"
        ));
        assert!(matches!(
            from_location("http://[::1/flags.yaml", None),
            Err(Error::InvalidLocation(_))
        ));
    }

    #[test]
    fn file_url_reads_from_disk() {
        let path = std::fs::canonicalize("tests/data/flags.yaml").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        let reader = from_location(url.as_str(), None).unwrap();
        assert_eq!(reader.read().unwrap(), std::fs::read(path).unwrap());
    }
}
