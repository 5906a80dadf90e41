//! `erratic` – runs the Erratic bridge as a process.
//!
//! 1. Loads `~/.erratic/config.toml` (plus `ERRATIC_*` overrides).
//! 2. Acquires the driver globals and loads the controller driver.
//! 3. Starts the bus dispatch thread, then builds and starts the bridge.
//! 4. Enables the motors, waits for the robot geometry and pumps telemetry
//!    until Ctrl-C.
//! 5. Stops the bridge and joins the dispatch thread.
//!
//! Exits non-zero if the bridge cannot be started.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use erratic_bridge::{BridgeConfig, ErraticBridge, MOTION_ADDR, POWER_ADDR, init_tracing};
use erratic_hal::{
    DeviceTable, DriverConfig, DriverRuntime, MessageQueue, SimErratic, SimSettings,
};
use erratic_middleware::{EventBus, Node};
use erratic_types::BridgeError;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let _guard = init_tracing("erratic");
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "erratic bridge failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), BridgeError> {
    let cfg = config::load()?;
    info!(path = %config::config_path().display(), ?cfg, "configuration loaded");

    // Released on every return below, including early failures.
    let mut runtime = DriverRuntime::init()?;

    let mut driver_cfg = DriverConfig::new();
    driver_cfg.insert(0, "provides", MOTION_ADDR.to_string());
    driver_cfg.insert(1, "provides", POWER_ADDR.to_string());
    driver_cfg.insert(0, "port", cfg.port_name.clone());
    let driver = SimErratic::from_config(
        &driver_cfg,
        SimSettings {
            voltage: cfg.sim_voltage,
            ..SimSettings::default()
        },
    )?;
    driver_cfg.warn_unused();
    runtime.load(Arc::new(driver));

    let node = Node::new("erratic", EventBus::default());
    let spinner = {
        let node = node.clone();
        thread::Builder::new()
            .name("bus-dispatch".to_string())
            .spawn(move || node.spin())
            .map_err(|e| BridgeError::Channel(format!("failed to spawn dispatch thread: {e}")))?
    };

    let outcome = drive(&node, runtime.table(), cfg.bridge_config(), |queue| {
        install_ctrlc_handler(&node, queue)
    });

    node.shutdown();
    match spinner.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "dispatch loop failed"),
        Err(_) => warn!("dispatch thread panicked"),
    }
    outcome
}

fn install_ctrlc_handler(node: &Node, queue: &MessageQueue) {
    let node = node.clone();
    let queue = queue.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Ctrl-C received; shutting down");
        node.shutdown();
        queue.interrupt();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }
}

/// Build the bridge over `table` and run it on `node` until shutdown.
///
/// `on_ready` gets the bridge's queue before anything is subscribed, so it
/// can arrange for the pump to be woken on shutdown.
fn drive(
    node: &Node,
    table: &DeviceTable,
    config: BridgeConfig,
    on_ready: impl FnOnce(&MessageQueue),
) -> Result<(), BridgeError> {
    let mut bridge = ErraticBridge::new(node, table, config)?;
    on_ready(bridge.queue());

    if let Err(e) = bridge.start(node) {
        // Only releases anything when both devices were subscribed.
        if let Err(stop_err) = bridge.stop() {
            warn!(error = %stop_err, "bridge did not stop cleanly");
        }
        return Err(e);
    }

    if let Err(e) = bridge.set_motor_state(true) {
        error!(error = %e, "failed to enable motors");
    }
    bridge.get_center()?;

    bridge.run(node);

    if let Err(e) = bridge.stop() {
        warn!(error = %e, "bridge did not stop cleanly");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use erratic_types::{EventPayload, Interface};
    use std::thread::JoinHandle;
    use std::time::Duration;

    fn quick_config() -> BridgeConfig {
        BridgeConfig {
            request_timeout: Duration::from_millis(200),
            geom_retry_interval: Duration::from_millis(20),
            shutdown_grace: Duration::ZERO,
            ..BridgeConfig::default()
        }
    }

    fn sim_table(sim: &SimErratic) -> DeviceTable {
        let mut table = DeviceTable::new();
        table.register(sim.motion());
        table.register(sim.power());
        table
    }

    fn spawn_spinner(node: &Node) -> JoinHandle<Result<(), BridgeError>> {
        let node = node.clone();
        thread::spawn(move || node.spin())
    }

    #[test]
    fn refused_subscription_fails_before_the_pump() {
        let sim = SimErratic::new(SimSettings {
            fail_subscribe: Some(Interface::Power),
            ..SimSettings::default()
        });
        let node = Node::new("erratic-test", EventBus::default());
        let spinner = spawn_spinner(&node);

        let outcome = drive(&node, &sim_table(&sim), quick_config(), |_| {});
        assert!(matches!(outcome, Err(BridgeError::Subscribe { .. })));
        assert!(!sim.motors_enabled(), "motors must not be enabled after a failed start");

        node.shutdown();
        spinner.join().unwrap().unwrap();
    }

    #[test]
    fn runs_until_shutdown_and_releases_devices() {
        let sim = SimErratic::new(SimSettings {
            tick: Duration::from_millis(5),
            ..SimSettings::default()
        });
        let node = Node::new("erratic-test", EventBus::default());
        let mut odom_rx = node.bus().subscribe_to("odom");
        let spinner = spawn_spinner(&node);

        let mut stopper = None;
        let outcome = drive(&node, &sim_table(&sim), quick_config(), |queue| {
            let node = node.clone();
            let queue = queue.clone();
            stopper = Some(thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                node.shutdown();
                queue.interrupt();
            }));
        });
        stopper.expect("ready hook ran").join().unwrap();
        spinner.join().unwrap().unwrap();

        assert!(outcome.is_ok(), "{outcome:?}");
        assert!(sim.motors_enabled());
        assert_eq!(sim.subscriber_count(Interface::Position2d), 0);
        assert_eq!(sim.subscriber_count(Interface::Power), 0);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let odom = runtime.block_on(odom_rx.recv()).unwrap();
        assert!(matches!(odom.payload, EventPayload::Odometry(_)));
    }

    #[test]
    fn devices_are_released_when_the_dispatch_loop_is_gone() {
        let sim = SimErratic::new(SimSettings::default());
        let node = Node::new("erratic-test", EventBus::default());
        node.shutdown();
        node.spin().unwrap();

        let outcome = drive(&node, &sim_table(&sim), quick_config(), |_| {});
        assert!(matches!(outcome, Err(BridgeError::Channel(_))));
        assert_eq!(sim.subscriber_count(Interface::Position2d), 0);
        assert_eq!(sim.subscriber_count(Interface::Power), 0);
    }
}
