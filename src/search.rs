use serde::Serialize;

use crate::{http::extract_param, json, responder::Responder, unix_timestamp};

pub const QUERY_PARAM: &str = "q";
pub const DEFAULT_QUERY: &str = "default";
const RESULTS: [&str; 3] = ["result1", "result2", "result3"];

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    results: [&'static str; 3],
    pid: u32,
    timestamp: u64,
}

/// Answers every request with the `q` parameter and a fixed result list.
pub struct QueryResponder {
    pid: u32,
}

impl QueryResponder {
    pub fn new(pid: u32) -> QueryResponder {
        QueryResponder { pid }
    }
}

impl Responder for QueryResponder {
    fn name(&self) -> &str {
        "Search"
    }

    fn respond(&mut self, raw: &[u8]) -> String {
        let query = extract_param(raw, QUERY_PARAM);
        json::to_string(&SearchBody {
            query: query.as_deref().unwrap_or(DEFAULT_QUERY),
            results: RESULTS,
            pid: self.pid,
            timestamp: unix_timestamp(),
        })
    }
}
