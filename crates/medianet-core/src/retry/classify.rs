//! Classify HTTP status codes into retry severities.

use crate::error::Severity;

/// Classify a non-2xx HTTP status for retry decisions.
///
/// 401 and 403 stop the request; every other bad status may be retried.
pub fn classify_http_status(status: u16) -> Severity {
    match status {
        401 | 403 => Severity::Critical,
        _ => Severity::Recoverable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_401_and_403_critical() {
        assert_eq!(classify_http_status(401), Severity::Critical);
        assert_eq!(classify_http_status(403), Severity::Critical);
    }

    #[test]
    fn http_5xx_and_other_4xx_recoverable() {
        assert_eq!(classify_http_status(500), Severity::Recoverable);
        assert_eq!(classify_http_status(503), Severity::Recoverable);
        assert_eq!(classify_http_status(404), Severity::Recoverable);
        assert_eq!(classify_http_status(429), Severity::Recoverable);
    }
}
