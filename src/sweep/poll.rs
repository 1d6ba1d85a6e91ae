use std::time::Instant;

use log::warn;

use crate::scpi::ScpiError;
use crate::sweep::Pacing;

/// Repeatedly invoke a measurement read until it yields a value parseable
/// as a finite number, or the polling timeout elapses.
///
/// Overload sentinels (magnitude >= 1e30) are returned like any other
/// number; deciding what a reading means is the caller's job, this only
/// distinguishes "no value yet" from "a value".
///
/// - Unparseable reply: retry until the timeout, then `Ok(None)`.
/// - Reply timeout from the link: the instrument has nothing for us,
///   `Ok(None)` without further attempts.
/// - Transport failure: `Err` immediately, nothing to retry against.
pub fn poll_measurement<F>(mut read: F, pacing: &Pacing) -> Result<Option<f64>, ScpiError>
where
    F: FnMut() -> Result<String, ScpiError>,
{
    let start = Instant::now();
    let mut last_raw = String::from("<none>");
    loop {
        match read() {
            Ok(raw) => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => return Ok(Some(value)),
                _ => last_raw = raw,
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("measurement read failed: {e}");
                return Ok(None);
            }
        }
        if start.elapsed() >= pacing.poll_timeout {
            warn!("measurement polling timed out, last reply: '{last_raw}'");
            return Ok(None);
        }
        pacing.pause(pacing.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn first_numeric_reply_wins() {
        let pacing = Pacing::none();
        let got = poll_measurement(|| Ok("0.5".to_string()), &pacing).unwrap();
        assert_eq!(got, Some(0.5));
    }

    #[test]
    fn overload_sentinel_is_passed_through() {
        let pacing = Pacing::none();
        let got = poll_measurement(|| Ok("2e30".to_string()), &pacing).unwrap();
        assert_eq!(got, Some(2e30));
    }

    #[test]
    fn non_numeric_replies_retry_until_a_value_appears() {
        let mut pacing = Pacing::none();
        pacing.poll_timeout = std::time::Duration::from_secs(5);
        let mut replies = vec!["?", "?", "1.25"].into_iter();
        let got = poll_measurement(|| Ok(replies.next().unwrap().to_string()), &pacing).unwrap();
        assert_eq!(got, Some(1.25));
    }

    #[test]
    fn persistent_garbage_times_out_to_none() {
        let pacing = Pacing::none();
        let got = poll_measurement(|| Ok("N/A".to_string()), &pacing).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn reply_timeout_is_a_missing_value_not_a_failure() {
        let pacing = Pacing::none();
        let got = poll_measurement(
            || {
                Err(ScpiError::Timeout {
                    command: "x".into(),
                    timeout_secs: 0.0,
                })
            },
            &pacing,
        )
        .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn transport_failure_aborts_immediately() {
        let pacing = Pacing::none();
        let mut calls = 0;
        let result = poll_measurement(
            || {
                calls += 1;
                Err(ScpiError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "gone",
                )))
            },
            &pacing,
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
