use thiserror::Error;

use tokio::io::{AsyncRead, AsyncReadExt};

const CR: u8 = 13;
const LF: u8 = 10;
pub const HTTP_VERSION: &str = "HTTP/1.1";
pub const CRLF: &str = "\r\n";

/// Maximum number of bytes read from a client, in a single read.
pub const MAX_REQUEST_SIZE: usize = 1023;
/// Maximum length in bytes of an extracted parameter value.
pub const MAX_PARAM_LEN: usize = 255;

const GET_MARKER: &[u8] = b"GET ";

#[derive(Debug, PartialEq)]
pub enum Method {
    Get,
}

/// The first line of a GET request, split into its parts. Parts borrow the
/// raw bytes read from the socket, nothing is decoded.
#[derive(Debug)]
pub struct RequestLine<'a> {
    pub method: Method,
    pub path: &'a [u8],
    pub query: Option<&'a [u8]>,
    pub protocol: Option<&'a [u8]>,
}

#[derive(Error, Debug, PartialEq)]
pub enum ParsingError {
    #[error("There is no GET request line in the data read from the socket")]
    MissingRequestLine,
    #[error("The request line was impossible to parse, missing information")]
    MalformedRequest,
}

impl<'a> RequestLine<'a> {
    /// Finds the first `GET ` in the raw data and tokenizes the line that
    /// starts there. The line ends at CR, LF or the end of the data, since a
    /// single read is not guaranteed to hold a full line.
    pub fn parse(raw: &'a [u8]) -> Result<RequestLine<'a>, ParsingError> {
        let start = raw
            .windows(GET_MARKER.len())
            .position(|window| window == GET_MARKER)
            .ok_or(ParsingError::MissingRequestLine)?;
        let end = raw[start..]
            .iter()
            .position(|byte| *byte == CR || *byte == LF)
            .map_or(raw.len(), |offset| start + offset);

        let mut request_line = raw[start..end]
            .split(|byte| byte.is_ascii_whitespace())
            .filter(|token| !token.is_empty());
        // The marker guarantees the first token.
        request_line.next();
        let target = match request_line.next() {
            Some(target) => target,
            None => return Err(ParsingError::MalformedRequest),
        };
        let protocol = request_line.next();

        let (path, query) = match target.iter().position(|byte| *byte == b'?') {
            Some(position) => (&target[..position], Some(&target[position + 1..])),
            None => (target, None),
        };

        Ok(RequestLine {
            method: Method::Get,
            path,
            query,
            protocol,
        })
    }

    /// Value of the first `key=value` pair of the query string whose key is
    /// `key`. Values are not URL-decoded.
    pub fn param(&self, key: &str) -> Option<&'a [u8]> {
        self.query?.split(|byte| *byte == b'&').find_map(|pair| {
            let position = pair.iter().position(|byte| *byte == b'=')?;
            (&pair[..position] == key.as_bytes()).then_some(&pair[position + 1..])
        })
    }
}

/// Extracts the value of `key` from the request line found in `raw`. At
/// most [MAX_PARAM_LEN] input bytes are kept, then invalid UTF-8 is
/// replaced. `None` when there is no GET request line or the key is absent
/// from its query string.
pub fn extract_param(raw: &[u8], key: &str) -> Option<String> {
    let request_line = RequestLine::parse(raw).ok()?;
    let value = request_line.param(key)?;
    let end = char_floor(value, MAX_PARAM_LEN);
    Some(String::from_utf8_lossy(&value[..end]).into_owned())
}

/// Largest cut point not above `cap` that doesn't split a well-formed
/// multi-byte character. Invalid sequences are cut at `cap`.
fn char_floor(value: &[u8], cap: usize) -> usize {
    if cap >= value.len() {
        return value.len();
    }
    let mut end = cap;
    while end > cap.saturating_sub(3) && value[end] & 0xC0 == 0x80 {
        end -= 1;
    }
    if end < cap && (0xC0..0xF8).contains(&value[end]) {
        end
    } else {
        cap
    }
}

/// Reads the request with a single read of at most [MAX_REQUEST_SIZE]
/// bytes. Whatever arrived in that read is the whole request.
pub async fn read_request<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0_u8; MAX_REQUEST_SIZE];
    let bytes_read = stream.read(&mut buf).await?;
    buf.truncate(bytes_read);
    Ok(buf)
}

/// Wraps a JSON body in a `200 OK` response that closes the connection.
pub fn json_response(body: &str) -> String {
    format!(
        "{HTTP_VERSION} 200 OK{CRLF}\
         Content-Type: application/json{CRLF}\
         Content-Length: {}{CRLF}\
         Connection: close{CRLF}\
         {CRLF}\
         {body}",
        body.len()
    )
}
