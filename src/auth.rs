use rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::{http::extract_param, json, responder::Responder, unix_timestamp};

pub const TOKEN_LEN: usize = 32;
/// Seconds a token is announced as valid for.
pub const TOKEN_TTL: u64 = 3600;
pub const USER_PARAM: &str = "user";
pub const DEFAULT_USER: &str = "anonymous";

/// Draws [TOKEN_LEN] characters uniformly from `[A-Za-z0-9]`.
pub fn generate_token<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

#[derive(Debug, Serialize)]
struct AuthBody<'a> {
    user: &'a str,
    token: &'a str,
    pid: u32,
    expires: u64,
}

/// Issues an unsigned pseudo-random token for the `user` parameter.
///
/// Tokens are never stored nor validated, they only look like credentials.
/// The generator is seeded once and advances with every token, so the
/// issuer must live as long as the server.
pub struct TokenIssuer {
    pid: u32,
    rng: StdRng,
}

impl TokenIssuer {
    /// Seeds the generator with the current Unix time XOR the process id.
    pub fn new(pid: u32) -> TokenIssuer {
        TokenIssuer::with_seed(pid, unix_timestamp() ^ pid as u64)
    }

    pub fn with_seed(pid: u32, seed: u64) -> TokenIssuer {
        TokenIssuer {
            pid,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Responder for TokenIssuer {
    fn name(&self) -> &str {
        "Auth"
    }

    fn respond(&mut self, raw: &[u8]) -> String {
        let user = extract_param(raw, USER_PARAM);
        let token = generate_token(&mut self.rng);
        json::to_string(&AuthBody {
            user: user.as_deref().unwrap_or(DEFAULT_USER),
            token: &token,
            pid: self.pid,
            expires: unix_timestamp() + TOKEN_TTL,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn respond(issuer: &mut TokenIssuer, raw: &[u8]) -> Value {
        serde_json::from_str(&issuer.respond(raw)).unwrap()
    }

    #[test]
    fn generated_token_is_alphanumeric() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let token = generate_token(&mut rng);
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn same_seed_generates_same_tokens() {
        let mut first = StdRng::seed_from_u64(99);
        let mut second = StdRng::seed_from_u64(99);

        assert_eq!(generate_token(&mut first), generate_token(&mut second));
    }

    #[test]
    fn responding_with_user() {
        let mut issuer = TokenIssuer::with_seed(42, 1);
        let before = unix_timestamp();

        let body = respond(&mut issuer, b"GET /login?user=alice HTTP/1.1\r\n\r\n");

        assert_eq!(body["user"], "alice");
        assert_eq!(body["pid"], 42);
        assert_eq!(body["token"].as_str().unwrap().len(), TOKEN_LEN);
        let expires = body["expires"].as_u64().unwrap();
        assert!(expires >= before + TOKEN_TTL);
        assert!(expires <= unix_timestamp() + TOKEN_TTL);
    }

    #[test]
    fn responding_without_user_uses_anonymous() {
        let mut issuer = TokenIssuer::with_seed(42, 1);

        let body = respond(&mut issuer, b"GET /login HTTP/1.1\r\n\r\n");

        assert_eq!(body["user"], DEFAULT_USER);
    }

    #[test]
    fn body_has_documented_shape() {
        let mut issuer = TokenIssuer::with_seed(5, 1);

        let body = issuer.respond(b"GET /login?user=dan HTTP/1.1\r\n\r\n");

        assert!(body.starts_with(r#"{"user": "dan", "token": ""#));
        assert!(body.contains(r#"", "pid": 5, "expires": "#));
    }

    #[test]
    fn sequential_tokens_differ() {
        let mut issuer = TokenIssuer::new(42);
        let raw = b"GET /login?user=bob HTTP/1.1\r\n\r\n";

        let first = respond(&mut issuer, raw);
        let second = respond(&mut issuer, raw);

        assert_ne!(first["token"], second["token"]);
    }
}
