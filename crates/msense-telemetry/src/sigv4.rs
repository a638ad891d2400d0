//! Request signing, signature version 4
//!
//! Only what the store client needs: `POST /` with an empty query string
//! and a JSON body.

use crate::credentials::AwsCredentials;
use crate::error::TelemetryError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Scope of one signature
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub credentials: &'a AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

/// Headers to attach to the signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

impl SignedHeaders {
    /// Header name/value pairs, ready to add to a request
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("x-amz-date", self.amz_date.clone()),
            ("authorization", self.authorization.clone()),
        ];
        if let Some(token) = &self.security_token {
            out.push(("x-amz-security-token", token.clone()));
        }
        out
    }
}

/// Sign a `POST /` request
///
/// `headers` are the extra headers that will be sent (names in any case);
/// `host` must match the Host header the transport sends.
///
/// # Errors
/// [`TelemetryError::Signing`] if the HMAC cannot be keyed
pub fn sign_post(
    params: &SigningParams<'_>,
    host: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Result<SignedHeaders, TelemetryError> {
    let amz_date = params.time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.time.format("%Y%m%d").to_string();

    let mut canonical: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    canonical.push(("host".to_string(), host.to_string()));
    canonical.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &params.credentials.session_token {
        canonical.push(("x-amz-security-token".to_string(), token.clone()));
    }
    canonical.sort();

    let signed_names = canonical
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let header_block: String = canonical.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();

    let canonical_request = format!(
        "POST\n/\n\n{header_block}\n{signed_names}\n{}",
        hex::encode(Sha256::digest(body))
    );

    let scope = format!("{date}/{}/{}/aws4_request", params.region, params.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(
        &params.credentials.secret_access_key,
        &date,
        params.region,
        params.service,
    )?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    let credential = format!("{}/{scope}", params.credentials.access_key_id);
    let authorization = format!(
        "{ALGORITHM} Credential={credential}, SignedHeaders={signed_names}, Signature={signature}"
    );

    Ok(SignedHeaders {
        amz_date,
        authorization,
        security_token: params.credentials.session_token.clone(),
    })
}

/// Derive the per-day, per-region, per-service signing key
///
/// # Errors
/// [`TelemetryError::Signing`] if the HMAC cannot be keyed
pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<[u8; 32], TelemetryError> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<[u8; 32], TelemetryError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| TelemetryError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn signing_key_matches_published_example() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn scan_request_signature_is_stable() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
        let params = SigningParams {
            credentials: &creds,
            region: "us-east-1",
            service: "dynamodb",
            time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };
        let signed = sign_post(
            &params,
            "dynamodb.us-east-1.amazonaws.com",
            &[
                ("Content-Type", "application/x-amz-json-1.0"),
                ("X-Amz-Target", "DynamoDB_20120810.Scan"),
            ],
            br#"{"TableName":"biometrics","Limit":1}"#,
        )
        .unwrap();

        assert_eq!(signed.amz_date, "20240102T030405Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/us-east-1/dynamodb/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date;x-amz-target, \
             Signature=09c47245561ba3a1ffaf8cbb2f1a1dfe113b8baf103553a7ea1196aa85ee2b92"
        );
        assert_eq!(signed.pairs().len(), 2);
    }

    #[test]
    fn session_token_is_signed_and_sent() {
        let creds = AwsCredentials::new("AKID", "secret").with_session_token("token");
        let params = SigningParams {
            credentials: &creds,
            region: "eu-west-1",
            service: "dynamodb",
            time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };
        let signed = sign_post(&params, "localhost:8000", &[], b"{}").unwrap();
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"));
        assert_eq!(signed.pairs().last().unwrap().0, "x-amz-security-token");
    }
}
