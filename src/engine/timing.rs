//! RFC-3339-with-nanoseconds timestamp parsing for container `State.StartedAt`
//! / `State.FinishedAt` fields, and the `exec_time` computation built on top.
//!
//! Docker reports these as e.g. `2024-01-01T00:00:05.123456789Z`. A
//! millisecond-granularity parser would silently drop the last six digits of
//! precision; this module keeps it by splitting at the final `.` and parsing
//! the fractional seconds as a plain `f64`, the same way the original runner
//! does.

use chrono::NaiveDateTime;

use crate::error::AppError;

/// Docker's sentinel for "never set".
pub const SENTINEL_TIMESTAMP: &str = "0001-01-01T00:00:00Z";

/// A parsed Docker timestamp kept as a whole-seconds epoch count plus a
/// separate fractional-seconds component, rather than pre-combined into one
/// `f64`. Combining an epoch magnitude (~1.7e9 for current timestamps) with
/// a nanosecond fraction in a single `f64` exhausts the mantissa's ~15-17
/// significant digits before the fraction's low digits are represented; a
/// difference of two such combined values loses precision at the sub-µs
/// level. Keeping the parts apart lets `compute_exec_time` cancel the large
/// epoch magnitude first and only combine the small remainder into a float.
struct ParsedTimestamp {
    epoch_secs: i64,
    frac_secs: f64,
}

fn parse_docker_timestamp_parts(input: &str) -> Result<ParsedTimestamp, AppError> {
    let dot_index = input
        .rfind('.')
        .ok_or_else(|| AppError::timing_unknown(format!("no fractional seconds in {input:?}")))?;

    let (whole, frac_and_zone) = input.split_at(dot_index);
    // frac_and_zone starts with '.', ends with 'Z' (or a zone offset we don't expect here).
    let frac_str = frac_and_zone
        .strip_suffix('Z')
        .unwrap_or(frac_and_zone);

    let naive = NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| AppError::timing_unknown(format!("bad timestamp {input:?}: {e}")))?;

    let frac_secs: f64 = frac_str
        .parse()
        .map_err(|e| AppError::timing_unknown(format!("bad fractional seconds {input:?}: {e}")))?;

    Ok(ParsedTimestamp {
        epoch_secs: naive.and_utc().timestamp(),
        frac_secs,
    })
}

/// Parses an RFC-3339 timestamp with nanosecond precision into a Unix epoch
/// float. Exposed for callers that need a single comparable instant; prefer
/// [`compute_exec_time`] for differences, since combining the epoch and the
/// fraction here loses the precision that function preserves by cancelling
/// the epoch magnitude before combining.
pub fn parse_docker_timestamp(input: &str) -> Result<f64, AppError> {
    let parsed = parse_docker_timestamp_parts(input)?;
    Ok(parsed.epoch_secs as f64 + parsed.frac_secs)
}

/// Computes `exec_time`: the difference between finish and start, or the
/// `-1.0` sentinel when the container never reached a finish timestamp
/// (killed before the engine recorded one).
///
/// The whole-seconds counts are subtracted as integers and the fractional
/// components are subtracted separately before either touches a float
/// combined with the (much larger) epoch magnitude, so a run's nanosecond
/// precision survives even though a single absolute timestamp can't be
/// represented to that precision as one `f64`.
pub fn compute_exec_time(started_at: &str, finished_at: &str) -> Result<f64, AppError> {
    if finished_at == SENTINEL_TIMESTAMP {
        return Ok(-1.0);
    }

    let started = parse_docker_timestamp_parts(started_at)?;
    let finished = parse_docker_timestamp_parts(finished_at)?;

    Ok((finished.epoch_secs - started.epoch_secs) as f64 + (finished.frac_secs - started.frac_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nanosecond_precision() {
        let t = parse_docker_timestamp("2024-01-01T00:00:00.123456789Z").unwrap();

        // Reference computed independently of the parser's own float
        // addition, via whole nanoseconds since epoch, so this actually
        // exercises the precision of `t` rather than re-deriving the same
        // lossy sum and comparing it to itself. A single combined f64 can't
        // hold sub-microsecond precision at this epoch magnitude (~1.7e9),
        // so the tolerance reflects that rather than the full 1ns the
        // uncombined parts preserve in `compute_exec_time`.
        let epoch_nanos: i128 = 1_704_067_200_000_000_000 + 123_456_789;
        let reference = (epoch_nanos as f64) / 1_000_000_000.0;
        assert!((t - reference).abs() < 1e-6);
    }

    #[test]
    fn exec_time_is_nonnegative_for_a_real_run() {
        let started = "2024-01-01T00:00:00.000000000Z";
        let finished = "2024-01-01T00:00:05.500000000Z";
        let dt = compute_exec_time(started, finished).unwrap();
        assert!((dt - 5.5).abs() < 1e-9);
        assert!(dt >= 0.0);
    }

    #[test]
    fn exec_time_preserves_nanosecond_precision_across_the_epoch_cancellation() {
        // Same whole second, 1ns apart: the epoch magnitude cancels exactly,
        // so the nanosecond difference must survive into the result. This
        // would fail under the old combine-then-subtract approach, which
        // loses precision far coarser than 1ns at this epoch magnitude.
        let started = "2024-01-01T00:00:00.100000000Z";
        let finished = "2024-01-01T00:00:00.100000001Z";
        let dt = compute_exec_time(started, finished).unwrap();
        assert!((dt - 1e-9).abs() < 1e-12);
    }

    #[test]
    fn exec_time_is_negative_one_for_a_killed_container() {
        let started = "2024-01-01T00:00:00.123456789Z";
        let finished = "0001-01-01T00:00:00Z";
        assert_eq!(compute_exec_time(started, finished).unwrap(), -1.0);
    }

    #[test]
    fn rejects_timestamp_without_fraction() {
        assert!(parse_docker_timestamp("2024-01-01T00:00:00Z").is_err());
    }
}
