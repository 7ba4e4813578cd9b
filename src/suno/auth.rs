use crate::browser::ObservedExchange;
use crate::config::ContractConfig;
use std::fmt;

/// Headers lifted from one authenticated request the web app made. Treated
/// as an opaque credential: replayed verbatim, never logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    headers: Vec<(String, String)>,
}

impl CredentialBundle {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    /// Bundle for replaying listing requests. The authorization, device and
    /// affiliate headers come from the request; the session id comes from the
    /// response. Absent headers are left out, except the affiliate id, which
    /// falls back to a fixed placeholder.
    pub fn for_listing(exchange: &ObservedExchange, contract: &ContractConfig) -> Self {
        let mut headers = Vec::with_capacity(4);
        let mut push = |name: &str, value: Option<&String>| {
            if let Some(v) = value {
                headers.push((name.to_string(), v.clone()));
            }
        };
        let req = &exchange.request_headers;
        push(&contract.authorization_header, req.get(&contract.authorization_header));
        push(&contract.session_id_header, exchange.response_headers.get(&contract.session_id_header));
        push(&contract.device_id_header, req.get(&contract.device_id_header));
        let affiliate = req
            .get(&contract.affiliate_id_header)
            .cloned()
            .unwrap_or_else(|| contract.affiliate_fallback.clone());
        headers.push((contract.affiliate_id_header.clone(), affiliate));
        Self { headers }
    }

    /// Listing bundle plus the fixed headers the follow endpoint expects.
    pub fn for_follow(exchange: &ObservedExchange, contract: &ContractConfig, base_url: &str) -> Self {
        let mut bundle = Self::for_listing(exchange, contract);
        let origin = base_url.trim_end_matches('/');
        bundle.headers.push(("content-type".to_string(), contract.content_type.clone()));
        bundle.headers.push(("origin".to_string(), origin.to_string()));
        bundle.headers.push(("referer".to_string(), format!("{}/", origin)));
        bundle
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("CredentialBundle")
            .field("headers", &names)
            .finish_non_exhaustive()
    }
}
