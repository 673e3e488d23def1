//! App2app authentication request carried between two apps

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::CODE_CHALLENGE_METHOD;

/// An authorization request sent from one app to another that holds a
/// session for the same project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App2AppAuthenticateRequest {
    /// The receiving app's app2app URI, without query.
    pub authorization_endpoint: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub code_challenge: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl App2AppAuthenticateRequest {
    /// Parse an incoming request URI.
    ///
    /// Returns `None` when `redirect_uri`, `client_id` or `code_challenge`
    /// is missing.
    pub fn parse(uri: &Url) -> Option<Self> {
        let mut redirect_uri = None;
        let mut client_id = None;
        let mut code_challenge = None;
        let mut state = None;
        for (key, value) in uri.query_pairs() {
            match key.as_ref() {
                "redirect_uri" => redirect_uri = Some(value.into_owned()),
                "client_id" => client_id = Some(value.into_owned()),
                "code_challenge" => code_challenge = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        let mut endpoint = uri.clone();
        endpoint.set_query(None);
        endpoint.set_fragment(None);

        Some(Self {
            authorization_endpoint: endpoint.to_string(),
            redirect_uri: redirect_uri?,
            client_id: client_id?,
            code_challenge: code_challenge?,
            state,
        })
    }

    /// The URI to open in the receiving app.
    ///
    /// # Errors
    /// Returns the parse error if `authorization_endpoint` is not a URL.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
                .append_pair("code_challenge", &self.code_challenge);
            if let Some(state) = &self.state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_mandatory_parameters() {
        let url = Url::parse("https://app.example.com/app2app?client_id=c&redirect_uri=x").unwrap();
        assert!(App2AppAuthenticateRequest::parse(&url).is_none());
    }

    #[test]
    fn test_parse_strips_query_from_endpoint() {
        let url = Url::parse(
            "https://app.example.com/app2app?client_id=c&redirect_uri=com.example%3A%2F%2Fcb&code_challenge=abc&code_challenge_method=S256",
        )
        .unwrap();
        let request = App2AppAuthenticateRequest::parse(&url).unwrap();
        assert_eq!(request.authorization_endpoint, "https://app.example.com/app2app");
        assert_eq!(request.redirect_uri, "com.example://cb");
        assert_eq!(request.client_id, "c");
        assert_eq!(request.code_challenge, "abc");
        assert!(request.state.is_none());
    }

    #[test]
    fn test_to_url_sets_s256_method() {
        let request = App2AppAuthenticateRequest {
            authorization_endpoint: "https://app.example.com/app2app".into(),
            redirect_uri: "com.example://cb".into(),
            client_id: "c".into(),
            code_challenge: "abc".into(),
            state: Some("s".into()),
        };
        let url = request.to_url().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("code_challenge_method".into(), "S256".into())));
        assert!(pairs.contains(&("state".into(), "s".into())));
        assert_eq!(App2AppAuthenticateRequest::parse(&url).unwrap(), request);
    }
}
