/// Produces the JSON body answered for a raw request.
///
/// Missing or malformed parameters never fail, they fall back to a default
/// value, so every request gets a body.
pub trait Responder {
    /// Service name used in log lines, ex.: "Search".
    fn name(&self) -> &str;

    fn respond(&mut self, raw: &[u8]) -> String;
}
