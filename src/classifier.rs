//! HTTP gesture classifier.
//!
//! Posts the encoded frame and a fixed instruction as `multipart/form-data`
//! and expects a JSON body of the form
//! `{"gesture": "OPEN", "handPosition": {"x": 0.5, "y": -0.3}}`.

use std::time::Duration;

use crate::error::ClassifierError;
use crate::gesture::{parse_response, Classifier, GestureSample};

/// Instruction sent alongside every frame.
pub const INSTRUCTION: &str = "Analyze this image of a user's hand. \
Identify the gesture and the approximate position of the hand in the frame. \
Rules: \
1. Gesture must be one of: 'OPEN' (fingers spread/palm visible), 'CLOSED' (fist), or 'NONE' (no hand clearly visible). \
2. Position X: -1.0 is far left, 1.0 is far right, 0.0 is center. \
3. Position Y: -1.0 is bottom, 1.0 is top, 0.0 is center. \
Respond with JSON only: {\"gesture\": \"OPEN\"|\"CLOSED\"|\"NONE\", \"handPosition\": {\"x\": number, \"y\": number}}.";

/// Blocking HTTP client for a vision endpoint.
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: None,
            timeout,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, jpeg: &[u8]) -> Result<GestureSample, ClassifierError> {
        let image = reqwest::blocking::multipart::Part::bytes(jpeg.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .text("instruction", INSTRUCTION)
            .part("image", image);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                ClassifierError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::Gesture;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Serve one request with a canned response; returns the request body.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/classify", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut content_length = None;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse::<usize>().ok();
                }
                if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                    chunked = true;
                }
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }

            let mut request_body = Vec::new();
            if let Some(len) = content_length {
                request_body.resize(len, 0);
                reader.read_exact(&mut request_body).unwrap();
            } else if chunked {
                loop {
                    let mut size = String::new();
                    reader.read_line(&mut size).unwrap();
                    let n = usize::from_str_radix(size.trim(), 16).unwrap_or(0);
                    let mut chunk = vec![0; n + 2];
                    reader.read_exact(&mut chunk).unwrap();
                    if n == 0 {
                        break;
                    }
                    request_body.extend_from_slice(&chunk[..n]);
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request_body
        });
        (url, handle)
    }

    #[test]
    fn test_classify_posts_frame_and_instruction() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"gesture":"CLOSED","handPosition":{"x":-0.25,"y":0.5}}"#,
        );
        let classifier = HttpClassifier::new(url, Duration::from_secs(5)).unwrap();
        let sample = classifier.classify(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        assert_eq!(sample.gesture, Gesture::Closed);
        assert!((sample.position.x + 0.25).abs() < 1e-6);
        assert!((sample.position.y - 0.5).abs() < 1e-6);

        let body = String::from_utf8_lossy(&server.join().unwrap()).into_owned();
        assert!(body.contains("name=\"instruction\""));
        assert!(body.contains("name=\"image\""));
        assert!(body.contains("image/jpeg"));
    }

    #[test]
    fn test_http_error_status() {
        let (url, server) = serve_once("503 Service Unavailable", "{}");
        let classifier = HttpClassifier::new(url, Duration::from_secs(5)).unwrap();
        let err = classifier.classify(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ClassifierError::Status { status: 503 }));
        server.join().unwrap();
    }

    #[test]
    fn test_malformed_body_is_schema_error() {
        let (url, server) = serve_once("200 OK", r#"{"gesture":"THUMBS_UP"}"#);
        let classifier = HttpClassifier::new(url, Duration::from_secs(5)).unwrap();
        let err = classifier.classify(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ClassifierError::Schema(_)));
        server.join().unwrap();
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let classifier = HttpClassifier::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        let err = classifier.classify(&[1]).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Transport(_) | ClassifierError::Timeout { .. }
        ));
    }

    #[test]
    fn test_instruction_names_all_gestures() {
        for word in ["'OPEN'", "'CLOSED'", "'NONE'", "handPosition"] {
            assert!(INSTRUCTION.contains(word), "{word}");
        }
    }
}
