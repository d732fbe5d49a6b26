//! Cache key namespace and normalization.
//!
//! Every key lives under the hierarchical `parlo:<module>:<type>:<id...>`
//! namespace. Key shapes are interoperability contracts with already
//! persisted data; change them only with a migration.

use std::time::Duration;

use chrono::{Days, Local, Timelike};

use crate::tasks::DemoType;

/// Root namespace segment for every key this crate writes.
pub const APP_NAMESPACE: &str = "parlo";

/// Canonical cache-key fragment for free-form text: lowercase, strip
/// non-word/non-space characters, spaces to underscores, truncated to 100
/// characters.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == ' ')
        .map(|c| if c == ' ' { '_' } else { c })
        .take(100)
        .collect()
}

pub fn evaluation_result(evaluation_id: &str) -> String {
    format!("{APP_NAMESPACE}:eval:result:{evaluation_id}")
}

pub fn feedback_text(score: u32, problem_word: &str, level: &str) -> String {
    format!(
        "{APP_NAMESPACE}:feedback:text:{score}:{}:{level}",
        normalize_text(problem_word)
    )
}

pub fn demo_audio(demo_type: DemoType, demo_text: &str) -> String {
    format!(
        "{APP_NAMESPACE}:demo:audio:{}:{}",
        demo_type.as_str(),
        normalize_text(demo_text)
    )
}

pub fn upload_token(token: &str) -> String {
    format!("{APP_NAMESPACE}:upload:token:{token}")
}

/// Day-scoped set of upload tokens that were already consumed.
pub fn upload_tokens_used(day_stamp: &str) -> String {
    format!("{APP_NAMESPACE}:upload:used:{day_stamp}")
}

pub fn user_profile(user_id: &str) -> String {
    format!("{APP_NAMESPACE}:user:profile:{user_id}")
}

pub fn user_stats(user_id: &str) -> String {
    format!("{APP_NAMESPACE}:user:stats:{user_id}")
}

pub fn session(session_id: &str) -> String {
    format!("{APP_NAMESPACE}:user:session:{session_id}")
}

pub fn daily_quota(user_id: &str, day_stamp: &str) -> String {
    format!("{APP_NAMESPACE}:quota:eval:{user_id}:{day_stamp}")
}

pub fn lock(name: &str) -> String {
    format!("{APP_NAMESPACE}:lock:{name}")
}

/// Today's quota day stamp in local time, `YYYYMMDD`.
pub fn local_day_stamp() -> String {
    Local::now().format("%Y%m%d").to_string()
}

/// Remaining time until the next local midnight, used as the quota
/// counter's TTL. Never zero.
///
/// Computed from the actual next-day midnight so DST transitions (23- or
/// 25-hour local days) do not shift the quota window.
pub fn ttl_until_local_midnight() -> Duration {
    let now = Local::now();
    let next_midnight = (now.date_naive() + Days::new(1))
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest());
    let seconds = match next_midnight {
        Some(at) => (at - now).num_seconds(),
        // Midnight skipped by a DST jump in this zone; approximate with a
        // 24-hour day.
        None => 86_400 - i64::from(now.num_seconds_from_midnight()),
    };
    Duration::from_secs(seconds.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_vectors() {
        assert_eq!(normalize_text("Hello World"), "hello_world");
        assert_eq!(normalize_text("Don't stop!"), "dont_stop");
        assert_eq!(normalize_text("  A  B  "), "__a__b__");
        assert_eq!(normalize_text("già überall"), "già_überall");
        let long = "a".repeat(200);
        assert_eq!(normalize_text(&long).chars().count(), 100);
    }

    #[test]
    fn key_shapes_are_stable() {
        assert_eq!(
            evaluation_result("eval-42"),
            "parlo:eval:result:eval-42"
        );
        assert_eq!(
            feedback_text(85, "Pronunciation", "A"),
            "parlo:feedback:text:85:pronunciation:A"
        );
        assert_eq!(
            demo_audio(DemoType::Word, "Quick Brown"),
            "parlo:demo:audio:word:quick_brown"
        );
        assert_eq!(
            daily_quota("u-1", "20260830"),
            "parlo:quota:eval:u-1:20260830"
        );
        assert_eq!(session("s-9"), "parlo:user:session:s-9");
        assert_eq!(lock("eval:42"), "parlo:lock:eval:42");
    }

    #[test]
    fn midnight_ttl_is_positive_and_bounded() {
        let ttl = ttl_until_local_midnight();
        assert!(ttl.as_secs() >= 1);
        // A DST transition day can run 25 local hours.
        assert!(ttl.as_secs() <= 25 * 3600);
    }

    #[test]
    fn midnight_ttl_expires_on_the_next_local_day() {
        let now = Local::now();
        let ttl = ttl_until_local_midnight();
        // num_seconds truncates sub-second remainders, so pad by a second.
        let at_expiry = now + chrono::Duration::from_std(ttl).unwrap() + chrono::Duration::seconds(1);
        assert!(at_expiry.date_naive() > now.date_naive());
    }

    #[test]
    fn day_stamp_is_eight_digits() {
        let stamp = local_day_stamp();
        assert_eq!(stamp.len(), 8);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }
}
