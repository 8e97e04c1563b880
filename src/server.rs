use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::info;
use prometheus::Encoder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

use crate::alu::AluMode;
use crate::cpu::{Cpu, MachineConfig};
use crate::error::{ConfigError, LoadError, Ls8Error};
use crate::loader::parse_image;
use crate::memory::MEMORY_SIZE;
use crate::metrics::{init_metrics, record_api_request, set_active_machines, Timer, REGISTRY};
use crate::snapshots::{CpuState, MachineSnapshot, SnapshotStore};

const DEFAULT_MAX_STEPS: u64 = 1_000_000;
/// Bytes of console output a machine keeps; older lines are dropped first.
const CONSOLE_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Cap on instructions executed per request
    pub max_steps: u64,
}

impl ServerConfig {
    /// Read `LS8_BIND_ADDR` and `LS8_MAX_STEPS`, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("LS8_BIND_ADDR") {
            config.bind_addr = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "LS8_BIND_ADDR",
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup("LS8_MAX_STEPS") {
            config.max_steps = match value.parse::<u64>() {
                Ok(steps) if steps > 0 => steps,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "LS8_MAX_STEPS",
                        value,
                    })
                }
            };
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub image: String,
    pub corrected: Option<bool>,
    pub max_steps: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMachineRequest {
    pub image: String,
    pub corrected: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSteps {
    pub steps: u32,
}

#[derive(Debug, Deserialize)]
pub struct MemoryRead {
    pub address: usize,
    pub length: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub snapshot_id: String,
}

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub output: Vec<String>,
    pub steps_executed: u64,
    pub halted: bool,
    /// Machine fault that stopped the run, if any
    pub fault: Option<String>,
    pub final_state: CpuState,
}

#[derive(Debug, Serialize)]
pub struct MachineState {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub output: Vec<String>,
    pub cpu: CpuState,
}

#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub steps_executed: u32,
    pub halted: bool,
    pub fault: Option<String>,
    pub output: Vec<String>,
    pub final_state: CpuState,
}

#[derive(Debug, Serialize)]
pub struct MemoryData {
    pub address: usize,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub machine_id: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// A loaded machine plus everything it has printed.
pub struct Machine {
    pub cpu: Cpu,
    pub created_at: DateTime<Utc>,
    console: Vec<u8>,
    console_limit: usize,
}

impl Machine {
    pub fn from_image(source: &str, config: MachineConfig) -> Result<Self, LoadError> {
        let program = parse_image(source)?;
        let mut cpu = Cpu::with_config(config);
        cpu.load(&program).map_err(|_| LoadError::ImageTooLarge {
            capacity: MEMORY_SIZE,
        })?;
        Ok(Self {
            cpu,
            created_at: Utc::now(),
            console: Vec::new(),
            console_limit: CONSOLE_LIMIT,
        })
    }

    pub fn step(&mut self) -> Result<(), Ls8Error> {
        let result = self.cpu.step(&mut self.console);
        self.trim_console();
        result
    }

    pub fn run(&mut self) -> Result<u64, Ls8Error> {
        let result = self.cpu.run(&mut self.console);
        self.trim_console();
        result
    }

    // Drop whole lines from the front until the buffer fits the limit
    fn trim_console(&mut self) {
        if self.console.len() <= self.console_limit {
            return;
        }
        let excess = self.console.len() - self.console_limit;
        let cut = self.console[excess..]
            .iter()
            .position(|&byte| byte == b'\n')
            .map_or(self.console.len(), |newline| excess + newline + 1);
        self.console.drain(..cut);
    }

    pub fn execute_steps(&mut self, steps: u32) -> ExecutionResult {
        let mut executed = 0;
        let mut fault = None;

        for _ in 0..steps {
            if self.cpu.is_halted() {
                break;
            }
            if let Err(err) = self.step() {
                fault = Some(err.to_string());
                break;
            }
            executed += 1;
        }

        ExecutionResult {
            steps_executed: executed,
            halted: self.cpu.is_halted(),
            fault,
            output: self.output(),
            final_state: CpuState::capture(&self.cpu),
        }
    }

    pub fn output(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.console)
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn state(&self, id: &str) -> MachineState {
        MachineState {
            id: id.to_string(),
            created_at: self.created_at,
            output: self.output(),
            cpu: CpuState::capture(&self.cpu),
        }
    }
}

type MachineMap = Arc<Mutex<HashMap<String, Machine>>>;

/// Shared state behind every route.
#[derive(Clone)]
pub struct ServerState {
    machines: MachineMap,
    snapshots: SnapshotStore,
    config: ServerConfig,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            machines: Arc::new(Mutex::new(HashMap::new())),
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    fn machines(&self) -> MutexGuard<'_, HashMap<String, Machine>> {
        self.machines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshots(&self) -> MutexGuard<'_, HashMap<String, MachineSnapshot>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn machine_config(&self, corrected: Option<bool>, max_steps: Option<u64>) -> MachineConfig {
        let alu_mode = if corrected.unwrap_or(false) {
            AluMode::Corrected
        } else {
            AluMode::Compatible
        };
        let limit = max_steps.map_or(self.config.max_steps, |n| n.min(self.config.max_steps));
        MachineConfig {
            alu_mode,
            max_steps: Some(limit),
        }
    }
}

pub async fn run_server(config: ServerConfig) {
    init_metrics();

    let bind_addr = config.bind_addr;
    let state = ServerState::new(config);

    info!("LS-8 emulator service listening on http://{}", bind_addr);
    info!("  POST   /run                    - Load and run an image to HLT");
    info!("  POST   /machine                - Create a stepping session");
    info!("  GET    /machine/:id            - Get machine state");
    info!("  POST   /machine/:id/step       - Execute one instruction");
    info!("  POST   /machine/:id/execute    - Execute several instructions");
    info!("  GET    /machine/:id/memory     - Read memory");
    info!("  POST   /machine/:id/snapshot   - Capture a snapshot");
    info!("  POST   /machine/:id/restore    - Restore a snapshot");
    info!("  GET    /machines               - List sessions");
    info!("  DELETE /machine/:id            - Delete a session");
    info!("  GET    /metrics                - Prometheus metrics");

    warp::serve(routes(state)).run(bind_addr).await;
}

pub fn routes(
    state: ServerState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "DELETE"]);

    let run_program = warp::path!("run")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(run_handler);

    let create_machine = warp::path!("machine")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(create_machine_handler);

    let get_state = warp::path!("machine" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(get_state_handler);

    let step_machine = warp::path!("machine" / String / "step")
        .and(warp::post())
        .and(with_state(state.clone()))
        .map(step_handler);

    let execute_steps = warp::path!("machine" / String / "execute")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(execute_handler);

    let read_memory = warp::path!("machine" / String / "memory")
        .and(warp::get())
        .and(warp::query::<MemoryRead>())
        .and(with_state(state.clone()))
        .map(read_memory_handler);

    let take_snapshot = warp::path!("machine" / String / "snapshot")
        .and(warp::post())
        .and(with_state(state.clone()))
        .map(snapshot_handler);

    let restore_snapshot = warp::path!("machine" / String / "restore")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(restore_handler);

    let list_machines = warp::path!("machines")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(list_machines_handler);

    let delete_machine = warp::path!("machine" / String)
        .and(warp::delete())
        .and(with_state(state))
        .map(delete_machine_handler);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .map(metrics_handler);

    run_program
        .or(create_machine)
        .or(get_state)
        .or(step_machine)
        .or(execute_steps)
        .or(read_memory)
        .or(take_snapshot)
        .or(restore_snapshot)
        .or(list_machines)
        .or(delete_machine)
        .or(metrics)
        .with(cors)
}

fn with_state(
    state: ServerState,
) -> impl Filter<Extract = (ServerState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn respond<T: Serialize>(
    method: &str,
    endpoint: &str,
    timer: Timer,
    status: StatusCode,
    body: ApiResponse<T>,
) -> WithStatus<Json> {
    record_api_request(method, endpoint, status.as_u16(), timer.elapsed());
    warp::reply::with_status(warp::reply::json(&body), status)
}

fn not_found(method: &str, endpoint: &str, timer: Timer) -> WithStatus<Json> {
    respond::<()>(
        method,
        endpoint,
        timer,
        StatusCode::NOT_FOUND,
        ApiResponse::error("Machine not found".to_string()),
    )
}

fn run_handler(request: RunRequest, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let config = state.machine_config(request.corrected, request.max_steps);

    let mut machine = match Machine::from_image(&request.image, config) {
        Ok(machine) => machine,
        Err(err) => {
            return respond::<()>(
                "POST",
                "/run",
                timer,
                StatusCode::BAD_REQUEST,
                ApiResponse::error(err.to_string()),
            )
        }
    };

    let fault = machine.run().err().map(|err| err.to_string());
    let run_id = Uuid::new_v4().to_string();
    info!(
        "run {} finished after {} steps{}",
        run_id,
        machine.cpu.steps(),
        fault.as_deref().map(|f| format!(" ({})", f)).unwrap_or_default()
    );

    let result = RunResult {
        run_id,
        output: machine.output(),
        steps_executed: machine.cpu.steps(),
        halted: machine.cpu.is_halted(),
        fault,
        final_state: CpuState::capture(&machine.cpu),
    };
    respond("POST", "/run", timer, StatusCode::OK, ApiResponse::success(result))
}

fn create_machine_handler(request: CreateMachineRequest, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let config = state.machine_config(request.corrected, None);

    let machine = match Machine::from_image(&request.image, config) {
        Ok(machine) => machine,
        Err(err) => {
            return respond::<()>(
                "POST",
                "/machine",
                timer,
                StatusCode::BAD_REQUEST,
                ApiResponse::error(err.to_string()),
            )
        }
    };

    let id = Uuid::new_v4().to_string();
    let body = machine.state(&id);
    {
        let mut machines = state.machines();
        machines.insert(id.clone(), machine);
        set_active_machines(machines.len());
    }
    info!("created machine {}", id);

    respond("POST", "/machine", timer, StatusCode::OK, ApiResponse::success(body))
}

fn get_state_handler(id: String, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let machines = state.machines();

    match machines.get(&id) {
        Some(machine) => respond(
            "GET",
            "/machine/:id",
            timer,
            StatusCode::OK,
            ApiResponse::success(machine.state(&id)),
        ),
        None => not_found("GET", "/machine/:id", timer),
    }
}

fn step_handler(id: String, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let mut machines = state.machines();

    match machines.get_mut(&id) {
        Some(machine) => {
            let result = machine.execute_steps(1);
            respond("POST", "/machine/:id/step", timer, StatusCode::OK, ApiResponse::success(result))
        }
        None => not_found("POST", "/machine/:id/step", timer),
    }
}

fn execute_handler(id: String, request: ExecuteSteps, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let limit = u32::try_from(state.config.max_steps).unwrap_or(u32::MAX);
    let mut machines = state.machines();

    match machines.get_mut(&id) {
        Some(machine) => {
            let result = machine.execute_steps(request.steps.min(limit));
            respond("POST", "/machine/:id/execute", timer, StatusCode::OK, ApiResponse::success(result))
        }
        None => not_found("POST", "/machine/:id/execute", timer),
    }
}

fn read_memory_handler(id: String, query: MemoryRead, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let machines = state.machines();

    let machine = match machines.get(&id) {
        Some(machine) => machine,
        None => return not_found("GET", "/machine/:id/memory", timer),
    };

    let length = query.length.unwrap_or(1);
    let data: Result<Vec<u8>, Ls8Error> = (query.address..query.address.saturating_add(length))
        .map(|address| machine.cpu.memory().read(address))
        .collect();

    match data {
        Ok(data) => respond(
            "GET",
            "/machine/:id/memory",
            timer,
            StatusCode::OK,
            ApiResponse::success(MemoryData {
                address: query.address,
                data,
            }),
        ),
        Err(err) => respond::<()>(
            "GET",
            "/machine/:id/memory",
            timer,
            StatusCode::BAD_REQUEST,
            ApiResponse::error(err.to_string()),
        ),
    }
}

fn snapshot_handler(id: String, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let snapshot = match state.machines().get(&id) {
        Some(machine) => MachineSnapshot::capture(&id, &machine.cpu),
        None => return not_found("POST", "/machine/:id/snapshot", timer),
    };

    let info = SnapshotInfo {
        id: snapshot.id.clone(),
        machine_id: snapshot.machine_id.clone(),
        created_at: snapshot.created_at,
        size_bytes: snapshot.size_bytes,
    };
    state.snapshots().insert(snapshot.id.clone(), snapshot);

    respond("POST", "/machine/:id/snapshot", timer, StatusCode::OK, ApiResponse::success(info))
}

fn restore_handler(id: String, request: RestoreRequest, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let snapshot = match state.snapshots().get(&request.snapshot_id) {
        Some(snapshot) if snapshot.machine_id == id => snapshot.clone(),
        _ => {
            return respond::<()>(
                "POST",
                "/machine/:id/restore",
                timer,
                StatusCode::NOT_FOUND,
                ApiResponse::error("Snapshot not found for this machine".to_string()),
            )
        }
    };

    let mut machines = state.machines();
    let machine = match machines.get_mut(&id) {
        Some(machine) => machine,
        None => return not_found("POST", "/machine/:id/restore", timer),
    };

    match snapshot.restore_into(&mut machine.cpu) {
        Ok(()) => respond(
            "POST",
            "/machine/:id/restore",
            timer,
            StatusCode::OK,
            ApiResponse::success(machine.state(&id)),
        ),
        Err(err) => respond::<()>(
            "POST",
            "/machine/:id/restore",
            timer,
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::error(err.to_string()),
        ),
    }
}

fn list_machines_handler(state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let machines = state.machines();

    let list: Vec<MachineState> = machines
        .iter()
        .map(|(id, machine)| machine.state(id))
        .collect();

    respond("GET", "/machines", timer, StatusCode::OK, ApiResponse::success(list))
}

fn delete_machine_handler(id: String, state: ServerState) -> WithStatus<Json> {
    let timer = Timer::new();
    let mut machines = state.machines();

    match machines.remove(&id) {
        Some(_) => {
            set_active_machines(machines.len());
            state.snapshots().retain(|_, snapshot| snapshot.machine_id != id);
            info!("deleted machine {}", id);
            respond(
                "DELETE",
                "/machine/:id",
                timer,
                StatusCode::OK,
                ApiResponse::success(format!("Machine {} deleted", id)),
            )
        }
        None => not_found("DELETE", "/machine/:id", timer),
    }
}

fn metrics_handler() -> impl warp::Reply {
    let timer = Timer::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => {
            record_api_request("GET", "/metrics", 200, timer.elapsed());
            warp::reply::with_status(
                warp::reply::with_header(metrics_text, "content-type", "text/plain; version=0.0.4"),
                StatusCode::OK,
            )
        }
        Err(_) => {
            record_api_request("GET", "/metrics", 500, timer.elapsed());
            warp::reply::with_status(
                warp::reply::with_header(
                    "Error encoding metrics".to_string(),
                    "content-type",
                    "text/plain",
                ),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3030");
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);

        let config = ServerConfig::from_lookup(|key| match key {
            "LS8_BIND_ADDR" => Some("0.0.0.0:8080".to_string()),
            "LS8_MAX_STEPS" => Some("500".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_steps, 500);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = ServerConfig::from_lookup(|key| {
            (key == "LS8_MAX_STEPS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LS8_MAX_STEPS", .. }));

        assert!(ServerConfig::from_lookup(|key| {
            (key == "LS8_BIND_ADDR").then(|| "not-an-address".to_string())
        })
        .is_err());
    }

    #[test]
    fn test_machine_config_caps_requested_steps() {
        let state = ServerState::new(ServerConfig {
            max_steps: 100,
            ..ServerConfig::default()
        });
        assert_eq!(state.machine_config(None, Some(10_000)).max_steps, Some(100));
        assert_eq!(state.machine_config(Some(true), Some(5)).max_steps, Some(5));
        assert_eq!(state.machine_config(Some(true), None).alu_mode, AluMode::Corrected);
    }

    #[test]
    fn test_session_console_keeps_most_recent_lines() {
        use crate::opcodes::*;

        // Print r0, add one, jump back to the PRN forever
        let program = [
            LDI, 1, 9,
            LDI, 2, 1,
            LDI, 0, 0,
            PRN, 0,
            ADD, 0, 2,
            JMP, 1,
        ];
        let image: String = program.iter().map(|byte| format!("{:08b}\n", byte)).collect();
        let mut machine = Machine::from_image(&image, MachineConfig::default()).unwrap();
        machine.console_limit = 16;

        for _ in 0..3 {
            let result = machine.execute_steps(21);
            assert!(result.fault.is_none());
            assert!(machine.console.len() <= 16);
        }

        assert_eq!(machine.output(), vec!["15", "16", "17", "18", "19"]);
    }
}
