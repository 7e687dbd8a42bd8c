use std::time::Duration;

use isa_sampler::sampler::TraversalOutcome;
use isa_sampler::timeout::with_timeout;
use isa_sampler::{analyze_path_with_timeout, SamplerConfig, SamplerError, TimeoutConfig};

use crate::common::images::pe64;
use crate::common::test_utils::create_temp_file;

#[tokio::test]
async fn analysis_within_deadline_completes() {
    let image = pe64(&[0x90, 0x90, 0xC3], &[]);
    let file = create_temp_file(&image);

    let report = analyze_path_with_timeout(
        file.path(),
        SamplerConfig::default(),
        &TimeoutConfig::fast("pe64"),
    )
    .await
    .unwrap();
    assert_eq!(report.instruction_count, 3);
    assert_eq!(report.outcome, TraversalOutcome::Completed);
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let result = analyze_path_with_timeout(
        "/nonexistent/isa-sampler/input",
        SamplerConfig::default(),
        &TimeoutConfig::fast("missing"),
    )
    .await;
    assert!(matches!(result, Err(SamplerError::Io(_))));
}

#[tokio::test]
async fn elapsed_future_reports_timeout() {
    let limit = TimeoutConfig {
        duration: Duration::from_millis(10),
        log_warnings: false,
        operation_name: "sleep".to_string(),
    };
    let result: isa_sampler::Result<()> = with_timeout(&limit, async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(SamplerError::Timeout { .. })));
}
