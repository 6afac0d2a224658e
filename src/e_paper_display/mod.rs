pub mod interface;

use crate::color::BACKGROUND;
use crate::config::PanelConfig;
use crate::constants::command_code::CommandCode;
use crate::constants::known_pin::Level::{High, Low};
use crate::convert::Frame;
use crate::display_constants::{FRAME_BYTES, HEIGHT, WIDTH};
use interface::{PanelInterface, SpidevInterface};
use linux_embedded_hal::sysfs_gpio::Error as GpioError;
use linux_embedded_hal::SPIError;
use std::io;
use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EpdError {
    #[error(transparent)]
    Spi(#[from] SPIError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error("panel still busy after {waited:?}")]
    ProtocolTimeout { waited: Duration },
    #[error("cannot {operation} while the panel is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PanelState,
    },
    #[error("frame is {actual} bytes, the panel takes {expected}")]
    FrameSize { expected: usize, actual: usize },
    #[error("panel worker has stopped")]
    WorkerStopped,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PanelState {
    Asleep,
    Initializing,
    Idle,
    Busy,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PanelTiming {
    /// held after each edge of the reset pulse
    pub reset_settle: Duration,
    pub power_on_settle: Duration,
    /// the physical refresh takes seconds; the busy line is not trusted before this
    pub refresh_settle: Duration,
    pub sleep_settle: Duration,
    pub busy_poll: Duration,
    pub busy_timeout: Duration,
}

impl From<&PanelConfig> for PanelTiming {
    fn from(config: &PanelConfig) -> Self {
        PanelTiming {
            reset_settle: Duration::from_millis(config.reset_settle_ms),
            power_on_settle: Duration::from_millis(100),
            refresh_settle: Duration::from_millis(config.refresh_settle_ms),
            sleep_settle: Duration::from_millis(config.sleep_settle_ms),
            busy_poll: Duration::from_millis(config.busy_poll_ms),
            busy_timeout: Duration::from_secs(config.busy_timeout_secs),
        }
    }
}

const BOOT_SEQUENCE: [CommandCode; 11] = [
    CommandCode::PowerSetting,
    CommandCode::VcmDcSetting,
    CommandCode::BoosterSoftStart,
    CommandCode::PllControl,
    CommandCode::PowerOn,
    CommandCode::PanelSetting,
    CommandCode::TconResolution,
    CommandCode::DualSpi,
    CommandCode::VcomAndDataInterval,
    CommandCode::TconSetting,
    CommandCode::GateSourceStart,
];

/// Protocol driver for the 800x480 V2 controller.
///
/// `Asleep --reset--> Initializing --initialize--> Idle`, `Idle --display/clear--> Busy --> Idle`,
/// `Idle --sleep--> Asleep`. Any failure leaves the device `Asleep`, so the
/// next use starts again from `reset`.
#[derive(Debug)]
pub struct EpdDevice<I> {
    interface: I,
    timing: PanelTiming,
    state: PanelState,
}

impl<I: PanelInterface> EpdDevice<I> {
    pub fn new(interface: I, timing: PanelTiming) -> Self {
        EpdDevice {
            interface,
            timing,
            state: PanelState::Asleep,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    fn expect_state(&self, operation: &'static str, expected: PanelState) -> Result<(), EpdError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EpdError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn finish(&mut self, result: Result<(), EpdError>, next: PanelState) -> Result<(), EpdError> {
        self.state = match result {
            Ok(()) => next,
            Err(_) => PanelState::Asleep,
        };
        result
    }

    fn send_command(&mut self, command_code: CommandCode) -> Result<(), EpdError> {
        debug!("Write {:?}", command_code);
        self.interface.send_command(command_code.cmd())?;
        if let Some(data) = command_code.data() {
            self.interface.send_data(data)?;
        }
        Ok(())
    }

    fn wait_until_idle(&mut self) -> Result<(), EpdError> {
        let started = Instant::now();
        while self.interface.is_busy()? {
            let waited = started.elapsed();
            if waited >= self.timing.busy_timeout {
                warn!("panel still busy after {:?}, giving up", waited);
                return Err(EpdError::ProtocolTimeout { waited });
            }
            debug!("Still waiting for idle...");
            sleep(self.timing.busy_poll);
        }
        Ok(())
    }

    /// Pulses the reset line, leaving the controller in its power-on state.
    pub fn reset(&mut self) -> Result<(), EpdError> {
        let result = (|| -> Result<(), EpdError> {
            for level in [High, Low, High] {
                debug!("Reset: {:?}", level);
                self.interface.set_reset(level)?;
                sleep(self.timing.reset_settle);
            }
            Ok(())
        })();
        self.finish(result, PanelState::Initializing)
    }

    /// Sends the power, booster, resolution and waveform settings.
    pub fn initialize(&mut self) -> Result<(), EpdError> {
        self.expect_state("initialize", PanelState::Initializing)?;
        info!("EPD init...");
        let result = (|| -> Result<(), EpdError> {
            self.wait_until_idle()?;
            for command in BOOT_SEQUENCE {
                self.send_command(command)?;
                if command == CommandCode::PowerOn {
                    sleep(self.timing.power_on_settle);
                }
                self.wait_until_idle()?;
            }
            Ok(())
        })();
        self.finish(result, PanelState::Idle)
    }

    fn refresh(&mut self, planes: &[(CommandCode, &[u8])]) -> Result<(), EpdError> {
        self.state = PanelState::Busy;
        let result = (|| -> Result<(), EpdError> {
            for (command, data) in planes {
                self.send_command(*command)?;
                self.interface.send_data(data)?;
                self.send_command(CommandCode::DataStop)?;
            }
            self.send_command(CommandCode::DisplayRefresh)?;
            sleep(self.timing.refresh_settle);
            self.wait_until_idle()
        })();
        self.finish(result, PanelState::Idle)
    }

    /// Shows `frame` on the active plane. Irreversible once the refresh is issued.
    pub fn display(&mut self, frame: &Frame) -> Result<(), EpdError> {
        self.expect_state("display", PanelState::Idle)?;
        if frame.len() != FRAME_BYTES {
            return Err(EpdError::FrameSize {
                expected: FRAME_BYTES,
                actual: frame.len(),
            });
        }
        self.refresh(&[(CommandCode::DataStartTransmission2, frame.as_bytes())])
    }

    /// Fills both planes with the background tone and refreshes.
    pub fn clear(&mut self) -> Result<(), EpdError> {
        self.expect_state("clear", PanelState::Idle)?;
        let blank = Frame::filled(BACKGROUND, WIDTH, HEIGHT);
        self.refresh(&[
            (CommandCode::DataStartTransmission1, blank.as_bytes()),
            (CommandCode::DataStartTransmission2, blank.as_bytes()),
        ])
    }

    /// Powers off and enters deep sleep; only reset + initialize wake it again.
    pub fn sleep(&mut self) -> Result<(), EpdError> {
        self.expect_state("sleep", PanelState::Idle)?;
        let result = (|| -> Result<(), EpdError> {
            self.send_command(CommandCode::PowerOff)?;
            self.wait_until_idle()?;
            self.send_command(CommandCode::DeepSleep)?;
            sleep(self.timing.sleep_settle);
            Ok(())
        })();
        self.finish(result, PanelState::Asleep)
    }

    /// Wakes the panel, runs `body`, and puts it back to sleep. The first
    /// error wins; sleep is skipped when the controller is not idle.
    pub fn run_sequence<F>(&mut self, body: F) -> Result<(), EpdError>
    where
        F: FnOnce(&mut Self) -> Result<(), EpdError>,
    {
        debug!("-> Reset");
        self.reset()?;
        debug!("-> Init");
        self.initialize()?;
        let result = body(self);
        if self.state != PanelState::Idle {
            return result;
        }
        debug!("-> Sleep");
        let slept = self.sleep();
        result.and(slept)
    }

    #[cfg(test)]
    fn interface(&self) -> &I {
        &self.interface
    }
}

/// The panel as seen by the rest of the program: either a driver that owns
/// the hardware, or nothing on machines without it.
#[derive(Debug)]
pub enum Panel<I = SpidevInterface> {
    Available(EpdDevice<I>),
    Unavailable,
}

impl Panel<SpidevInterface> {
    pub fn open(config: &PanelConfig) -> Result<Self, EpdError> {
        let interface = SpidevInterface::open(config)?;
        Ok(Panel::Available(EpdDevice::new(interface, config.into())))
    }

    /// Opens the panel when this machine is expected to have one.
    /// `Ok(Unavailable)` means there is nothing to drive; `Err` means the
    /// hardware should be there but could not be opened.
    pub fn detect(config: &PanelConfig) -> Result<Self, EpdError> {
        let compatible = cfg!(any(target_arch = "arm", target_arch = "aarch64"));
        if !(compatible && config.enabled) {
            info!("Skipping screen init: not running on compatible hardware");
            return Ok(Panel::Unavailable);
        }
        Self::open(config)
    }

    /// Service mode: a panel that fails to open degrades to `Unavailable`.
    pub fn probe(config: &PanelConfig) -> Self {
        match Self::detect(config) {
            Ok(panel) => panel,
            Err(e) => {
                warn!("Failed to initialize screen, running headless: {}", e);
                Panel::Unavailable
            }
        }
    }
}

impl<I: PanelInterface> Panel<I> {
    pub fn is_available(&self) -> bool {
        matches!(self, Panel::Available(_))
    }

    pub fn display_frame(&mut self, frame: &Frame) -> Result<(), EpdError> {
        match self {
            Panel::Available(device) => {
                device.run_sequence(|device| {
                    debug!("-> Displaying");
                    device.display(frame)
                })
            }
            Panel::Unavailable => {
                debug!("Screen unavailable: skipping display");
                Ok(())
            }
        }
    }

    pub fn clear_screen(&mut self) -> Result<(), EpdError> {
        match self {
            Panel::Available(device) => {
                device.run_sequence(|device| {
                    debug!("-> Clear");
                    device.clear()
                })
            }
            Panel::Unavailable => {
                debug!("Screen unavailable: skipping clear");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Tone;
    use crate::constants::known_pin::Level;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Command(u8),
        Data(Vec<u8>),
        Reset(Level),
    }

    /// Records every wire operation. After each command the busy line reads
    /// busy `busy_polls` times, or forever when `stuck`.
    #[derive(Debug, Default)]
    struct MockInterface {
        ops: Vec<Op>,
        busy_polls: usize,
        pending_busy: usize,
        stuck: bool,
    }

    impl MockInterface {
        fn commands(&self) -> Vec<u8> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Command(c) => Some(*c),
                    _ => None,
                })
                .collect()
        }

        fn data_after(&self, command: u8) -> Vec<&[u8]> {
            self.ops
                .windows(2)
                .filter_map(|pair| match pair {
                    [Op::Command(c), Op::Data(d)] if *c == command => Some(d.as_slice()),
                    _ => None,
                })
                .collect()
        }
    }

    impl PanelInterface for MockInterface {
        fn send_command(&mut self, command: u8) -> Result<(), EpdError> {
            self.ops.push(Op::Command(command));
            self.pending_busy = self.busy_polls;
            Ok(())
        }

        fn send_data(&mut self, data: &[u8]) -> Result<(), EpdError> {
            self.ops.push(Op::Data(data.to_vec()));
            Ok(())
        }

        fn set_reset(&mut self, level: Level) -> Result<(), EpdError> {
            self.ops.push(Op::Reset(level));
            Ok(())
        }

        fn is_busy(&mut self) -> Result<bool, EpdError> {
            if self.stuck {
                return Ok(true);
            }
            if self.pending_busy > 0 {
                self.pending_busy -= 1;
                return Ok(true);
            }
            Ok(false)
        }
    }

    fn timing() -> PanelTiming {
        PanelTiming {
            reset_settle: Duration::ZERO,
            power_on_settle: Duration::ZERO,
            refresh_settle: Duration::ZERO,
            sleep_settle: Duration::ZERO,
            busy_poll: Duration::from_millis(1),
            busy_timeout: Duration::from_millis(50),
        }
    }

    fn device(busy_polls: usize) -> EpdDevice<MockInterface> {
        let interface = MockInterface {
            busy_polls,
            ..Default::default()
        };
        EpdDevice::new(interface, timing())
    }

    fn light_frame() -> Frame {
        Frame::filled(Tone::Light, WIDTH, HEIGHT)
    }

    #[test]
    fn init_display_sleep_walks_the_state_machine() {
        let mut device = device(3);
        assert_eq!(device.state(), PanelState::Asleep);

        device.reset().unwrap();
        assert_eq!(device.state(), PanelState::Initializing);
        device.initialize().unwrap();
        assert_eq!(device.state(), PanelState::Idle);
        device.display(&light_frame()).unwrap();
        assert_eq!(device.state(), PanelState::Idle);
        device.sleep().unwrap();
        assert_eq!(device.state(), PanelState::Asleep);

        assert_eq!(
            device.interface().commands(),
            vec![
                0x01, 0x82, 0x06, 0x30, 0x04, 0x00, 0x61, 0x15, 0x50, 0x60, 0x65, // init
                0x13, 0x11, 0x12, // display
                0x02, 0x07, // sleep
            ]
        );
        assert_eq!(
            &device.interface().ops[..3],
            &[Op::Reset(High), Op::Reset(Low), Op::Reset(High)]
        );
    }

    #[test]
    fn display_sends_the_frame_on_the_new_plane() {
        let mut device = device(0);
        let bytes = Frame::filled(Tone::Dark, WIDTH, HEIGHT);
        device.run_sequence(|d| d.display(&bytes)).unwrap();

        let payloads = device.interface().data_after(0x13);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0], bytes.as_bytes());
        assert_eq!(device.interface().data_after(0x07), vec![&[0xA5][..]]);
    }

    #[test]
    fn clear_sends_background_to_both_planes() {
        let mut device = device(1);
        device.run_sequence(|d| d.clear()).unwrap();

        let blank = vec![BACKGROUND.fill_byte(); FRAME_BYTES];
        assert_eq!(device.interface().data_after(0x10), vec![blank.as_slice()]);
        assert_eq!(device.interface().data_after(0x13), vec![blank.as_slice()]);
        assert_eq!(device.state(), PanelState::Asleep);
    }

    #[test]
    fn commands_outside_idle_are_rejected() {
        let mut device = device(0);
        assert!(matches!(
            device.display(&light_frame()),
            Err(EpdError::InvalidState { operation: "display", state: PanelState::Asleep })
        ));
        assert!(matches!(
            device.initialize(),
            Err(EpdError::InvalidState { operation: "initialize", .. })
        ));
        assert!(device.interface().ops.is_empty());
    }

    #[test]
    fn wrong_frame_size_is_rejected_before_transmitting() {
        let mut device = device(0);
        device.reset().unwrap();
        device.initialize().unwrap();
        let sent = device.interface().ops.len();

        let small = Frame::filled(Tone::Light, 8, 8);
        assert!(matches!(
            device.display(&small),
            Err(EpdError::FrameSize { expected: FRAME_BYTES, actual: 8 })
        ));
        assert_eq!(device.interface().ops.len(), sent);
        assert_eq!(device.state(), PanelState::Idle);
    }

    #[test]
    fn stuck_busy_line_times_out() {
        let mut device = device(0);
        device.reset().unwrap();
        device.interface.stuck = true;

        match device.initialize() {
            Err(EpdError::ProtocolTimeout { waited }) => {
                assert!(waited >= timing().busy_timeout)
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(device.state(), PanelState::Asleep);
    }

    #[test]
    fn timeout_mid_sequence_skips_sleep() {
        let mut device = device(0);
        let result = device.run_sequence(|d| {
            d.interface.stuck = true;
            d.display(&light_frame())
        });

        assert!(matches!(result, Err(EpdError::ProtocolTimeout { .. })));
        assert!(!device.interface().commands().contains(&0x07));
        // the next sequence starts from reset again
        device.interface.stuck = false;
        device.run_sequence(|d| d.clear()).unwrap();
    }

    #[test]
    fn unavailable_panel_is_a_no_op() {
        let mut panel: Panel<MockInterface> = Panel::Unavailable;
        assert!(!panel.is_available());
        panel.display_frame(&light_frame()).unwrap();
        panel.clear_screen().unwrap();
    }

    #[test]
    fn available_panel_runs_full_sequence() {
        let mut panel = Panel::Available(device(2));
        panel.display_frame(&light_frame()).unwrap();
        let Panel::Available(device) = &panel else {
            unreachable!()
        };
        let commands = device.interface().commands();
        assert_eq!(commands.first(), Some(&0x01));
        assert_eq!(commands.last(), Some(&0x07));
        assert_eq!(device.state(), PanelState::Asleep);
    }
}
