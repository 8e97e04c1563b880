use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::time::{Duration, Instant};

use crate::alu::AluMode;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for instructions executed by opcode
    pub static ref INSTRUCTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("ls8_instructions_total", "Total number of LS-8 instructions executed by mnemonic"),
        &["instruction"]
    ).expect("Failed to create instructions counter");

    /// Counter for fetch-decode-execute steps
    pub static ref STEPS_TOTAL: Counter = Counter::new(
        "ls8_steps_total", "Total number of fetch-decode-execute steps"
    ).expect("Failed to create steps counter");

    /// Histogram for instruction execution time
    pub static ref INSTRUCTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ls8_instruction_duration_seconds", "Time spent executing instructions")
            .buckets(vec![0.000001, 0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001]),
        &["instruction"]
    ).expect("Failed to create instruction duration histogram");

    /// Counter for programs run to HLT, by ALU mode
    pub static ref PROGRAMS_RUN_TOTAL: CounterVec = CounterVec::new(
        Opts::new("ls8_programs_run_total", "Total number of programs run to completion"),
        &["alu_mode"]
    ).expect("Failed to create programs run counter");

    /// Counter for API requests by endpoint and method
    pub static ref API_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("ls8_api_requests_total", "Total number of API requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create API requests counter");

    /// Histogram for API request duration
    pub static ref API_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ls8_api_request_duration_seconds", "API request duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["method", "endpoint"]
    ).expect("Failed to create API request duration histogram");

    /// Gauge for live stepping sessions
    pub static ref ACTIVE_MACHINES: Gauge = Gauge::new(
        "ls8_active_machines", "Number of live machine sessions"
    ).expect("Failed to create active machines gauge");
}

/// Register every collector with the global registry. Safe to call twice.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(INSTRUCTIONS_TOTAL.clone()),
        Box::new(STEPS_TOTAL.clone()),
        Box::new(INSTRUCTION_DURATION.clone()),
        Box::new(PROGRAMS_RUN_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(API_REQUEST_DURATION.clone()),
        Box::new(ACTIVE_MACHINES.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(err) => log::warn!("failed to register metric: {}", err),
        }
    }
}

/// Record one executed instruction
pub fn record_instruction(instruction_name: &'static str, duration: Duration) {
    INSTRUCTIONS_TOTAL
        .with_label_values(&[instruction_name])
        .inc();

    STEPS_TOTAL.inc();

    INSTRUCTION_DURATION
        .with_label_values(&[instruction_name])
        .observe(duration.as_secs_f64());
}

/// Record a program that ran to HLT
pub fn record_program_run(mode: AluMode) {
    let label = match mode {
        AluMode::Compatible => "compatible",
        AluMode::Corrected => "corrected",
    };
    PROGRAMS_RUN_TOTAL.with_label_values(&[label]).inc();
}

/// Record an API request
pub fn record_api_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    API_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    API_REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

pub fn set_active_machines(count: usize) {
    ACTIVE_MACHINES.set(count as f64);
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    #[test]
    fn test_registered_metrics_are_exported() {
        init_metrics();
        init_metrics();

        record_instruction("LDI", Duration::from_nanos(500));
        record_program_run(AluMode::Corrected);

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("ls8_instructions_total"));
        assert!(text.contains("instruction=\"LDI\""));
        assert!(text.contains("alu_mode=\"corrected\""));
    }
}
