//! Deterministic cron schedules for periodic jobs.
//!
//! The minute is derived from a hash of the job name so jobs of the same type
//! do not all start at once, while regenerating the config keeps the same
//! schedule.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hours are given in US Pacific daylight time and converted to UTC.
const PDT_TO_UTC_HOURS: u32 = 7;

fn fnv1a(parts: &[&str]) -> u32 {
    parts
        .iter()
        .flat_map(|part| part.bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
        })
}

pub fn minute_offset(job_type: &str, job_name: &str) -> u32 {
    fnv1a(&[job_type, job_name]) % 60
}

fn utc_hour(pdt_hour: u32) -> u32 {
    (pdt_hour + PDT_TO_UTC_HOURS) % 24
}

/// Returns the schedule for a job type, or `None` when the type has no default.
///
/// Hourly jobs leave at least one hour between runs beyond their timeout.
pub fn generate_cron(job_type: &str, job_name: &str, timeout: i64) -> Option<String> {
    let minute = minute_offset(job_type, job_name);
    let interval_hours = (timeout.max(0) + 59) / 60 + 1;
    let hourly = if interval_hours > 1 {
        format!("{minute} */{interval_hours} * * *")
    } else {
        format!("{minute} * * * *")
    };
    let daily = |pdt_hour: u32| format!("{minute} {} * * *", utc_hour(pdt_hour));
    let weekly = |pdt_hour: u32, day: u32| format!("{minute} {} * * {day}", utc_hour(pdt_hour));

    let cron = match job_type {
        "continuous" | "custom-job" => hourly,
        "auto-release" => format!("{minute} */2 * * *"),
        "branch-ci" => daily(1),
        "nightly" => daily(2),
        "webhook-apicoverage" => daily(3),
        "go-coverage" => daily(4),
        "performance" => daily(5),
        "update-clusters" => daily(6),
        "dot-release" => weekly(2, 2),
        "recreate-clusters" => weekly(6, 6),
        _ => return None,
    };
    Some(cron)
}
