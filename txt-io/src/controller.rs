//! Session controller
//!
//! [`Controller`] owns one device connection and the tasks running on it:
//!
//! ```text
//!   Controller ──start_online──▶ ExchangeLoop  (txt-exchange)
//!        │                       KeepAlive     (txt-keep-alive, socket kinds)
//!        └──────start_camera───▶ CameraReceiver (txt-camera, own connection)
//! ```
//!
//! The transport is opened lazily through a [`Connector`] and dropped on
//! `stop_online` (or after the loop stopped on an error), so the next
//! `start_online` always begins with a fresh connection and fresh delta
//! coder baselines.

use crate::camera::{CameraFrame, CameraReceiver, RetryPolicy};
use crate::config::{Config, TransportKind};
use crate::constants::*;
use crate::core::{CmdId, InputConfig, IoConfig, OutputMode, SharedState};
use crate::error::{Error, Result};
use crate::exchange::{
    default_error_handler, CompressedCodec, CycleCodec, DataCallback, ErrorCallback,
    ExchangeLoop, KeepAlive, LoopState, SerialCodec, Session, SharedTransport, SocketCodec,
};
use crate::handles::{
    Button, ColorSensor, Input, JoyButton, JoyDipSwitch, Joystick, Motor, Output, Resistor, Stick,
    TrailFollower, Ultrasonic, Voltage,
};
use crate::protocol::socket::{self, StatusResponse};
use crate::transport::{transact, Connector, SerialTransport, TcpTransport, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Name reported for the direct serial link, which has no status query
const DIRECT_NAME: &str = "TXT direct";
const DIRECT_VERSION: u32 = 0x0401_0500;

/// Callbacks threaded into every task of a session
#[derive(Clone)]
pub struct ControllerOptions {
    pub on_error: ErrorCallback,
    pub on_data: Option<DataCallback>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            on_error: default_error_handler(),
            on_data: None,
        }
    }
}

/// One device connection and its background tasks
pub struct Controller {
    config: Config,
    options: ControllerOptions,
    shared: Arc<SharedState>,
    connector: Connector,
    camera_connector: Option<Arc<Mutex<Connector>>>,
    transport: Option<SharedTransport>,
    exchange: Option<ExchangeLoop>,
    keep_alive: Option<KeepAlive>,
    camera: Option<CameraReceiver>,
    status: Option<StatusResponse>,
}

impl Controller {
    /// Build a controller that connects over the transport named in `config`
    ///
    /// Nothing is opened yet; the first status query or `start_online` does.
    pub fn connect(config: Config, options: ControllerOptions) -> Result<Self> {
        let conn = config.connection.clone();
        let timeout = conn.timeout();

        let (connector, camera_connector): (Connector, Option<Connector>) = match conn.transport {
            TransportKind::Serial => {
                let path = conn.serial_port.clone();
                let baud_rate = conn.baud_rate;
                let connector: Connector = Box::new(move || {
                    let port = SerialTransport::open(&path, baud_rate, timeout)?;
                    Ok(Box::new(port) as Box<dyn Transport>)
                });
                (connector, None)
            }
            TransportKind::Tcp | TransportKind::Compressed => {
                let address = conn.address();
                let camera_address = conn.camera_address();
                let connector: Connector = Box::new(move || {
                    let stream = TcpTransport::connect(&address, timeout)?;
                    Ok(Box::new(stream) as Box<dyn Transport>)
                });
                let camera: Connector = Box::new(move || {
                    let stream = TcpTransport::connect(&camera_address, timeout)?;
                    Ok(Box::new(stream) as Box<dyn Transport>)
                });
                (connector, Some(camera))
            }
        };

        Self::with_connector(config, connector, camera_connector, options)
    }

    /// Build a controller on caller-supplied connectors (simulator, tests)
    pub fn with_connector(
        config: Config,
        connector: Connector,
        camera_connector: Option<Connector>,
        options: ControllerOptions,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(SharedState::new(config.exchange.extension_units));
        log::info!(
            "Controller created ({:?}, {} unit(s))",
            config.connection.transport,
            shared.unit_count()
        );
        Ok(Self {
            config,
            options,
            shared,
            connector,
            camera_connector: camera_connector.map(|c| Arc::new(Mutex::new(c))),
            transport: None,
            exchange: None,
            keep_alive: None,
            camera: None,
            status: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn kind(&self) -> TransportKind {
        self.config.connection.transport
    }

    fn is_socket(&self) -> bool {
        self.kind() != TransportKind::Serial
    }

    /// Current transport, opening it on first use
    fn transport(&mut self) -> Result<SharedTransport> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }
        let io = (self.connector)()?;
        let transport: SharedTransport = Arc::new(Mutex::new(io));
        self.transport = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// Send a request and check its 4-byte acknowledgement
    fn command(&mut self, command: &'static str, request: &[u8], ack: u32) -> Result<()> {
        let transport = self.transport()?;
        let reply = {
            let mut io = transport.lock();
            transact(&mut **io, request, ACK_SIZE)?
        };
        socket::check_ack(command, ack, &reply)
    }

    fn report(&self, message: &str, error: &Error) -> bool {
        (self.options.on_error)(message, Some(error))
    }

    // ========================================================================
    // Device info
    // ========================================================================

    /// Query name and version; a wrong response id is only logged
    pub fn query_status(&mut self) -> Result<StatusResponse> {
        if !self.is_socket() {
            let status = StatusResponse {
                id: ID_QUERY_STATUS_ACK,
                name: DIRECT_NAME.to_string(),
                version: DIRECT_VERSION,
            };
            self.status = Some(status.clone());
            return Ok(status);
        }

        let transport = self.transport()?;
        let status = {
            let mut io = transport.lock();
            let data = transact(&mut **io, &socket::encode_status_request(), STATUS_RESPONSE_SIZE)?;
            socket::decode_status(&data)?
        };
        if !status.id_matches() {
            log::warn!(
                "Status response id {:#010x} does not match {:#010x}",
                status.id,
                ID_QUERY_STATUS_ACK
            );
        }
        log::info!("Device: {} (version {:#x})", status.name, status.version);
        self.status = Some(status.clone());
        Ok(status)
    }

    fn cached_status(&mut self) -> Result<StatusResponse> {
        match &self.status {
            Some(status) => Ok(status.clone()),
            None => self.query_status(),
        }
    }

    pub fn device_name(&mut self) -> Result<String> {
        Ok(self.cached_status()?.name)
    }

    pub fn version_number(&mut self) -> Result<u32> {
        Ok(self.cached_status()?.version)
    }

    /// Firmware version as `major.minor.patch`
    pub fn firmware_version(&mut self) -> Result<String> {
        let version = self.version_number()?;
        socket::firmware_string(version)
            .ok_or_else(|| Error::Other(format!("unrecognised version number {:#x}", version)))
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start the online session and the exchange loop
    ///
    /// A start acknowledgement mismatch goes to the error callback; the
    /// session continues only if the callback returns `true`.
    pub fn start_online(&mut self) -> Result<()> {
        if self.is_online() {
            log::warn!("start_online: session already running");
            return Ok(());
        }
        if self.exchange.is_some() {
            // Previous session ended on an error or was stopped: begin from a
            // fresh connection
            self.stop_tasks()?;
            self.exchange = None;
            self.transport = None;
        }

        let transport = self.transport()?;
        if self.is_socket() {
            let request = socket::encode_start_online();
            if let Err(e) = self.command("start online", &request, ID_START_ONLINE_ACK) {
                if !self.report("Start online was not acknowledged", &e) {
                    self.transport = None;
                    return Err(e);
                }
            }
        }

        let mut session = Session::new(Arc::clone(&self.shared), transport);
        session.on_error = Arc::clone(&self.options.on_error);
        session.on_data = self.options.on_data.clone();

        let codec: Box<dyn CycleCodec> = match self.kind() {
            TransportKind::Tcp => Box::new(SocketCodec::new()),
            TransportKind::Serial => Box::new(SerialCodec::new()),
            TransportKind::Compressed => Box::new(CompressedCodec::new()),
        };
        let interval = self.config.exchange.update_interval();
        let idle = self.config.exchange.keep_alive();
        self.exchange = Some(ExchangeLoop::spawn(session.clone(), codec, interval)?);
        if self.is_socket() {
            self.keep_alive = Some(KeepAlive::spawn(session, idle)?);
        }

        log::info!("Online ({:?})", self.kind());
        Ok(())
    }

    /// Stop every task; the stopped exchange loop stays for `loop_state`
    fn stop_tasks(&mut self) -> Result<()> {
        if let Some(mut camera) = self.camera.take() {
            camera.stop()?;
        }
        if let Some(mut keep_alive) = self.keep_alive.take() {
            keep_alive.stop()?;
        }
        if let Some(exchange) = self.exchange.as_mut() {
            exchange.stop()?;
        }
        Ok(())
    }

    /// Stop every task, end the online session and close the transport
    pub fn stop_online(&mut self) -> Result<()> {
        if self.exchange.is_none() || self.transport.is_none() {
            return Err(Error::NotOnline);
        }
        if self.camera.is_some() {
            self.stop_camera()?;
        }
        self.stop_tasks()?;

        let mut result = Ok(());
        if self.is_socket() && self.transport.is_some() {
            let request = socket::encode_stop_online();
            if let Err(e) = self.command("stop online", &request, ID_STOP_ONLINE_ACK) {
                if !self.report("Stop online was not acknowledged", &e) {
                    result = Err(e);
                }
            }
        }
        self.transport = None;
        log::info!("Offline");
        result
    }

    /// True while the exchange loop is cycling
    pub fn is_online(&self) -> bool {
        self.exchange.as_ref().is_some_and(|e| e.is_running())
    }

    /// State of the current (or last) exchange loop
    pub fn loop_state(&self) -> LoopState {
        self.exchange
            .as_ref()
            .map(|e| e.state())
            .unwrap_or(LoopState::Idle)
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Block until the next completed exchange cycle
    pub fn wait_for_next_cycle(&self, min_poll: Duration) -> Result<()> {
        self.shared.wait_for_next_cycle(min_poll)
    }

    // ========================================================================
    // I/O configuration
    // ========================================================================

    /// Set the master's output and input modes and schedule a push
    pub fn set_config(
        &self,
        motors: [OutputMode; NUM_MOTORS],
        inputs: [InputConfig; NUM_INPUTS],
    ) -> u32 {
        let _scope = self.shared.begin_sync();
        self.shared.write(|s| {
            let config = &mut s.master_mut().io_config;
            config.motors = motors;
            config.inputs = inputs;
        });
        self.shared.bump_config_generation()
    }

    /// Replace one unit's whole configuration and schedule a push
    pub fn set_unit_config(&self, unit: usize, config: IoConfig) -> Result<u32> {
        let _scope = self.shared.begin_sync();
        self.shared.write_unit(unit, |u| u.io_config = config)?;
        Ok(self.shared.bump_config_generation())
    }

    /// Master configuration
    pub fn get_config(&self) -> IoConfig {
        self.shared.read(|s| s.master().io_config.clone())
    }

    pub fn get_unit_config(&self, unit: usize) -> Result<IoConfig> {
        self.shared.read_unit(unit, |u| u.io_config.clone())
    }

    /// Push the configuration again on the next cycle
    pub fn update_config(&self) -> u32 {
        self.shared.bump_config_generation()
    }

    // ========================================================================
    // Sound and outputs
    // ========================================================================

    /// Play sound `index` `repeat` times; index 0 stops playback
    pub fn play_sound(&self, index: u16, repeat: u16) -> Result<()> {
        if !self.is_socket() {
            return Err(Error::NotSupported(
                "sound is not available on the serial link".to_string(),
            ));
        }
        self.shared.write(|s| {
            let master = s.master_mut();
            master.sound_index = index;
            master.sound_repeat = repeat;
            master.bump(CmdId::Sound)
        })?;
        log::debug!("Sound {} x{}", index, repeat);
        Ok(())
    }

    pub fn stop_sound(&self) -> Result<()> {
        self.play_sound(0, 1)
    }

    /// True once the device echoed the last sound command
    pub fn sound_finished(&self) -> Result<bool> {
        self.shared.read(|s| s.master().is_acknowledged(CmdId::Sound))
    }

    /// Zero every output of every unit in one synchronized update
    pub fn stop_all(&self) {
        self.shared.write(|s| {
            for unit in &mut s.units {
                unit.pwm = [0; NUM_OUTPUTS];
            }
        });
    }

    // ========================================================================
    // Camera
    // ========================================================================

    /// Ask the device to stream camera frames and start receiving them
    pub fn start_camera(&mut self) -> Result<()> {
        if !self.is_socket() {
            return Err(Error::NotSupported(
                "camera is not available on the serial link".to_string(),
            ));
        }
        if !self.is_online() {
            return Err(Error::NotOnline);
        }
        let Some(camera_connector) = self.camera_connector.as_ref().map(Arc::clone) else {
            return Err(Error::NotSupported("no camera connection configured".to_string()));
        };
        if self.camera.as_ref().is_some_and(|c| c.is_running()) {
            return Ok(());
        }

        let cam = self.config.camera.clone();
        let request =
            socket::encode_start_camera(cam.width, cam.height, cam.framerate, cam.power_line_freq);
        self.command("start camera", &request, ID_START_CAMERA_ACK)?;

        let connector: Connector = Box::new(move || {
            let mut guard = camera_connector.lock();
            let connect: &mut Connector = &mut guard;
            connect()
        });
        let retry = RetryPolicy {
            interval: Duration::from_millis(CAMERA_CONNECT_RETRY_MS),
            attempts: CAMERA_CONNECT_ATTEMPTS,
        };
        self.camera = Some(CameraReceiver::spawn(
            connector,
            retry,
            Arc::clone(&self.options.on_error),
        )?);
        log::info!("Camera started ({}x{} @ {} fps)", cam.width, cam.height, cam.framerate);
        Ok(())
    }

    /// Stop the receiver and tell the device to stop streaming
    pub fn stop_camera(&mut self) -> Result<()> {
        let Some(mut camera) = self.camera.take() else {
            return Ok(());
        };
        camera.stop()?;
        if self.transport.is_some() {
            let request = socket::encode_stop_camera();
            if let Err(e) = self.command("stop camera", &request, ID_STOP_CAMERA_ACK) {
                if !self.report("Stop camera was not acknowledged", &e) {
                    return Err(e);
                }
            }
        }
        log::info!("Camera stopped");
        Ok(())
    }

    /// Newest camera frame not yet taken
    pub fn camera_frame(&self) -> Option<CameraFrame> {
        self.camera.as_ref().and_then(|c| c.take_frame())
    }

    // ========================================================================
    // Handles
    // ========================================================================

    pub fn motor(&self, unit: usize, channel: usize) -> Result<Motor> {
        Motor::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn output(&self, unit: usize, channel: usize) -> Result<Output> {
        Output::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn input(&self, unit: usize, channel: usize) -> Result<Input> {
        Input::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn resistor(&self, unit: usize, channel: usize) -> Result<Resistor> {
        Resistor::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn ultrasonic(&self, unit: usize, channel: usize) -> Result<Ultrasonic> {
        Ultrasonic::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn voltage(&self, unit: usize, channel: usize) -> Result<Voltage> {
        Voltage::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn color_sensor(&self, unit: usize, channel: usize) -> Result<ColorSensor> {
        ColorSensor::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn trail_follower(&self, unit: usize, channel: usize) -> Result<TrailFollower> {
        TrailFollower::attach(Arc::clone(&self.shared), unit, channel)
    }

    pub fn joystick(&self, stick: Stick, slot: usize) -> Result<Joystick> {
        Joystick::attach(Arc::clone(&self.shared), stick, slot)
    }

    pub fn joy_button(&self, button: Button, slot: usize) -> Result<JoyButton> {
        JoyButton::attach(Arc::clone(&self.shared), button, slot)
    }

    pub fn joy_dip_switch(&self) -> JoyDipSwitch {
        JoyDipSwitch::attach(Arc::clone(&self.shared))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.exchange.is_some() && self.transport.is_some() {
            if let Err(e) = self.stop_online() {
                log::warn!("Controller did not go offline cleanly: {}", e);
            }
        }
    }
}
