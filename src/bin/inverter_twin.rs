/// Inverter Twin
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
/// Runs the simulated SMA-style inverter: loads a device profile, starts the
/// simulation engine and serves the register bank over Modbus TCP until
/// Ctrl+C or SIGTERM.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::signal;

use voltage_twin::logging::{self, LoggingMode};
use voltage_twin::utils::format::format_metrics;
use voltage_twin::{
    Config, ModbusResult, ModbusServer, ModbusTcpServer, ModbusTcpServerConfig, RegisterBank,
    SimulationEngine, DEFAULT_TCP_PORT,
};

/// Modbus TCP digital twin of an SMA-style solar inverter
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Device profile (YAML or JSON)
    #[arg(value_name = "PROFILE")]
    profile: Option<PathBuf>,

    /// Device profile, takes precedence over the positional argument
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(long, short, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Packet tracing: off, raw, interpreted or both
    #[arg(long, default_value_t = LoggingMode::Off)]
    packet_log: LoggingMode,

    /// Close client connections idle for this many seconds
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

impl Args {
    fn profile_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| self.profile.clone())
            .unwrap_or_else(|| PathBuf::from("sma_inverter_profile.yaml"))
    }
}

fn load_config(path: &Path) -> ModbusResult<Config> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    info!("🚀 {}", voltage_twin::info());

    let profile = args.profile_path();
    let config = match load_config(&profile) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid profile {}: {}", profile.display(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "📄 Loaded profile {} ({} registers, unit {})",
        profile.display(),
        config.registers.len(),
        config.device_identity.unit_id
    );

    let register_bank = match config
        .to_registers()
        .and_then(RegisterBank::with_registers)
    {
        Ok(bank) => Arc::new(bank),
        Err(e) => {
            error!("❌ Failed to initialize register bank: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let bank_stats = register_bank.get_stats();
    info!(
        "🔧 Register bank ready: {} registers, {} words",
        bank_stats.logical_registers, bank_stats.mapped_words
    );

    let engine = SimulationEngine::new(
        register_bank.clone(),
        &config.device_identity,
        config.simulation_parameters.clone(),
    )
    .spawn();

    let server_config = ModbusTcpServerConfig {
        bind_address: SocketAddr::new(args.bind, args.port),
        idle_timeout: args.idle_timeout_secs.map(std::time::Duration::from_secs),
        packet_logging: args.packet_log,
        ..Default::default()
    };
    let mut server = ModbusTcpServer::with_config(server_config, register_bank);

    if let Err(e) = server.start().await {
        error!("❌ {}", e);
        if let Err(e) = engine.stop().await {
            error!("Failed to stop simulation engine: {}", e);
        }
        return ExitCode::FAILURE;
    }

    shutdown_signal().await;
    info!("🛑 Shutting down...");

    let mut exit = ExitCode::SUCCESS;
    if let Err(e) = server.stop().await {
        error!("Failed to stop server: {}", e);
        exit = ExitCode::FAILURE;
    }
    match engine.stop().await {
        Ok(engine) => info!("{}", format_metrics(engine.metrics())),
        Err(e) => {
            error!("Failed to stop simulation engine: {}", e);
            exit = ExitCode::FAILURE;
        }
    }

    let stats = server.get_stats();
    info!("📊 Server statistics:");
    info!("   - Uptime: {}s", stats.uptime_seconds);
    info!("   - Connections: {} ({} rejected)", stats.connections_count, stats.rejected_connections);
    info!(
        "   - Requests: {} ({} ok, {} failed)",
        stats.total_requests, stats.successful_requests, stats.failed_requests
    );
    info!("   - Bytes: {} received, {} sent", stats.bytes_received, stats.bytes_sent);

    exit
}
