use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::types::{Language, Mode};
use crate::utils::logging::TIMING_TARGET;

#[derive(Debug)]
pub struct SubmissionTimer {
    mode: Mode,
    language: Language,
    image_names: Vec<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl SubmissionTimer {
    pub fn new(mode: Mode, language: Language, image_names: Vec<String>) -> Self {
        SubmissionTimer {
            mode,
            language,
            image_names,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=submission_started mode={} language={} images={:?} started_at={}",
            self.mode,
            self.language,
            self.image_names,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=submission_completed mode={} language={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.mode,
            self.language,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for SubmissionTimer {
    fn drop(&mut self) {
        if !self.completed {
            self.mark_status("abandoned", None);
            self.log_completed();
        }
    }
}

pub fn start_submission_timer(
    mode: Mode,
    language: Language,
    image_names: Vec<String>,
) -> SubmissionTimer {
    let timer = SubmissionTimer::new(mode, language, image_names);
    timer.log_received();
    timer
}

pub fn complete_submission_timer(timer: &mut SubmissionTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_timing_passes_the_result_through() {
        let ok: Result<u8, String> =
            log_llm_timing("gemini", "m", "op", None, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, String> = log_llm_timing("gemini", "m", "op", None, || async {
            Err("boom".to_string())
        })
        .await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn submission_timer_completes_once() {
        let mut timer = start_submission_timer(Mode::Improve, Language::En, vec!["scene.jpg".into()]);
        complete_submission_timer(&mut timer, "error", Some("incomplete".into()));
        assert!(timer.completed);
        assert_eq!(timer.status, "error");
        timer.log_completed();
        assert_eq!(timer.detail.as_deref(), Some("incomplete"));
    }
}
