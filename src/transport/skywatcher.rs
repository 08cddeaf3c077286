use crate::config::ComSettings;
use crate::error::{CoreError, CoreResult};
use crate::queue::{CommandKind, CommandOutcome};
use crate::transport::Backend;
use crate::util::Axis;
use retry::delay::Exponential;
use retry::retry_with_index;
use std::io::{Read, Write};
use std::net::UdpSocket;
use std::time::Duration;

const NUM_TRIES: u64 = 3;
const RETRY_MILLIS: u64 = 10;

/// Prolific PL2303 USB-serial adapter, the common SkyWatcher hand-controller
/// chipset, used to autodetect a COM port when none is configured.
const PROLIFIC_VID: u16 = 0x067b;
const PROLIFIC_PID: u16 = 0x2303;

/// Raw byte transport for the SkyWatcher ASCII protocol: either a COM port
/// or a UDP "serial-over-IP" endpoint. Framed, blocking I/O only — the
/// Command Queue worker is the only caller.
pub trait SkyWatcherTransport: Send {
    fn write_command(&mut self, bytes: &[u8]) -> CoreResult<()>;
    fn read_response(&mut self) -> CoreResult<Vec<u8>>;
}

pub struct ComTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl ComTransport {
    pub fn open(settings: &ComSettings, path: &str) -> CoreResult<Self> {
        let mut port = serialport::new(path, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms as u64))
            .open()?;
        port.write_data_terminal_ready(settings.dtr)?;
        port.write_request_to_send(settings.rts)?;
        Ok(Self { port })
    }

    pub fn autodetect(settings: &ComSettings) -> CoreResult<Self> {
        let path = serialport::available_ports()?
            .into_iter()
            .find_map(|info| match info.port_type {
                serialport::SerialPortType::UsbPort(usb)
                    if usb.vid == PROLIFIC_VID && usb.pid == PROLIFIC_PID =>
                {
                    Some(info.port_name)
                }
                _ => None,
            })
            .ok_or_else(|| CoreError::SerialFailed("no SkyWatcher serial adapter found".into()))?;

        Self::open(settings, &path)
    }
}

impl SkyWatcherTransport for ComTransport {
    fn write_command(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.port.write_all(bytes).map_err(CoreError::from)
    }

    fn read_response(&mut self) -> CoreResult<Vec<u8>> {
        read_until_cr(&mut self.port)
    }
}

/// "ip:port" serial-over-IP endpoint.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn connect(addr: &str) -> CoreResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(1000)))?;
        Ok(Self { socket })
    }
}

impl SkyWatcherTransport for UdpTransport {
    fn write_command(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.socket.send(bytes)?;
        Ok(())
    }

    fn read_response(&mut self) -> CoreResult<Vec<u8>> {
        let mut buf = [0u8; 256];
        let n = self.socket.recv(&mut buf)?;
        Ok(buf[..n].to_vec())
    }
}

fn read_until_cr<R: Read>(reader: &mut R) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte)?;
        if n == 0 {
            break;
        }
        if byte[0] == b'\r' {
            break;
        }
        out.push(byte[0]);
    }
    Ok(out)
}

fn open_transport(settings: &ComSettings) -> CoreResult<Box<dyn SkyWatcherTransport>> {
    match &settings.path {
        Some(path) if path.contains(':') && path.parse::<std::net::SocketAddr>().is_ok() => {
            Ok(Box::new(UdpTransport::connect(path)?))
        }
        Some(path) => Ok(Box::new(ComTransport::open(settings, path)?)),
        None => Ok(Box::new(ComTransport::autodetect(settings)?)),
    }
}

fn axis_char(axis: Axis) -> char {
    match axis {
        Axis::Primary => '1',
        Axis::Secondary => '2',
    }
}

/// ASCII command set over the SkyWatcher wire protocol: motor-card
/// version, axis position get/set, axis status, go-to target, axis slew at
/// rate, steps, controller voltage, PEC enable, home-sensor search. This is
/// implemented directly against the documented command surface rather than
/// against an external vendor crate (see DESIGN.md).
pub struct SkyWatcherBackend {
    transport: Box<dyn SkyWatcherTransport>,
}

impl SkyWatcherBackend {
    pub fn new(transport: Box<dyn SkyWatcherTransport>) -> Self {
        Self { transport }
    }

    pub fn open(settings: &ComSettings) -> CoreResult<Self> {
        Ok(Self::new(open_transport(settings)?))
    }

    fn do_command_with_retries(&mut self, command: &[u8]) -> CoreResult<Vec<u8>> {
        retry_with_index(Exponential::from_millis(RETRY_MILLIS).take(NUM_TRIES as usize), |_| {
            self.transport
                .write_command(command)
                .and_then(|_| self.transport.read_response())
        })
        .map_err(|e| match e {
            retry::Error::Operation { error, .. } => error,
            _ => CoreError::SerialFailed("retry loop exhausted".into()),
        })
    }

    fn encode(payload: &CommandKind) -> (Vec<u8>, ResponseShape) {
        match *payload {
            CommandKind::GetMotorCardVersion => (b"e1\r".to_vec(), ResponseShape::Version),
            CommandKind::GetControllerVoltage => (b"f\r".to_vec(), ResponseShape::Voltage),
            // Steps are fetched as two separate round trips in `execute`
            // (the wire protocol replies to `j1\r` and `j2\r` as two
            // distinct framed responses, not one grouped reply); this arm
            // only keeps the match exhaustive.
            CommandKind::GetSteps | CommandKind::GetPositionsDegrees => {
                (Vec::new(), ResponseShape::Steps)
            }
            CommandKind::IsAxisFullStop(axis) => (
                format!("f{}\r", axis_char(axis)).into_bytes(),
                ResponseShape::FullStop,
            ),
            CommandKind::GoToAxisTarget(axis, degrees) => (
                format!("S{}{:.6}\r", axis_char(axis), degrees).into_bytes(),
                ResponseShape::Ack,
            ),
            CommandKind::SetAxisPosition(axis, degrees) => (
                format!("E{}{:.6}\r", axis_char(axis), degrees).into_bytes(),
                ResponseShape::Ack,
            ),
            CommandKind::MoveAxisRate(axis, rate) => (
                format!("I{}{:.6}\r", axis_char(axis), rate).into_bytes(),
                ResponseShape::Ack,
            ),
            CommandKind::StopAxis(axis) => {
                (format!("K{}\r", axis_char(axis)).into_bytes(), ResponseShape::Ack)
            }
            CommandKind::SetPecEnabled(on) => (
                format!("P{}\r", if on { '1' } else { '0' }).into_bytes(),
                ResponseShape::Ack,
            ),
            CommandKind::SearchHome(axis) => {
                (format!("W{}\r", axis_char(axis)).into_bytes(), ResponseShape::Ack)
            }
        }
    }

    fn decode(shape: ResponseShape, response: &[u8]) -> CoreResult<CommandOutcome> {
        let text = String::from_utf8_lossy(response);
        if let Some(code) = text.strip_prefix('!') {
            return Err(CoreError::MountError(format!("SkyWatcher error code {code}")));
        }
        let text = text.strip_prefix('=').unwrap_or(&text);

        Ok(match shape {
            ResponseShape::Version => CommandOutcome::MotorCardVersion(text.trim().to_string()),
            ResponseShape::Voltage => {
                let volts: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| CoreError::MountError("malformed voltage response".into()))?;
                CommandOutcome::Voltage(volts)
            }
            // Never reached: `execute` intercepts GetSteps/GetPositionsDegrees
            // before encode/decode and issues one round trip per axis
            // through `fetch_steps`.
            ResponseShape::Steps => unreachable!("steps are decoded per-axis in fetch_steps"),
            ResponseShape::FullStop => CommandOutcome::FullStop(text.trim() == "1"),
            ResponseShape::Ack => CommandOutcome::Ack,
        })
    }
}

enum ResponseShape {
    Version,
    Voltage,
    Steps,
    FullStop,
    Ack,
}

impl SkyWatcherBackend {
    /// `GetSteps`/`GetPositionsDegrees` read both axes, but the wire protocol
    /// answers `j1\r` and `j2\r` as two separately-framed `\r`-terminated
    /// replies (`read_until_cr` only ever returns one), so each axis needs
    /// its own write+read round trip.
    fn fetch_steps(&mut self) -> CoreResult<CommandOutcome> {
        let ra_response = self.do_command_with_retries(b"j1\r")?;
        let dec_response = self.do_command_with_retries(b"j2\r")?;
        let ra = Self::parse_steps_reply(&ra_response)?;
        let dec = Self::parse_steps_reply(&dec_response)?;
        Ok(CommandOutcome::Steps([ra, dec]))
    }

    fn parse_steps_reply(response: &[u8]) -> CoreResult<i64> {
        let text = String::from_utf8_lossy(response);
        if let Some(code) = text.strip_prefix('!') {
            return Err(CoreError::MountError(format!("SkyWatcher error code {code}")));
        }
        let text = text.strip_prefix('=').unwrap_or(&text);
        text.trim()
            .parse()
            .map_err(|_| CoreError::MountError("malformed steps response".into()))
    }
}

impl Backend for SkyWatcherBackend {
    fn execute(&mut self, payload: &CommandKind) -> CoreResult<CommandOutcome> {
        if matches!(payload, CommandKind::GetSteps | CommandKind::GetPositionsDegrees) {
            return self.fetch_steps();
        }
        let (command, shape) = Self::encode(payload);
        let response = self.do_command_with_retries(&command)?;
        Self::decode(shape, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeTransport {
        responses: Arc<Mutex<VecDeque<Vec<u8>>>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SkyWatcherTransport for FakeTransport {
        fn write_command(&mut self, bytes: &[u8]) -> CoreResult<()> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn read_response(&mut self) -> CoreResult<Vec<u8>> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| CoreError::SerialFailed("no queued response".into()))
        }
    }

    #[test]
    fn encodes_goto_and_decodes_ack() {
        let fake = FakeTransport::default();
        fake.responses.lock().unwrap().push_back(b"=\r".to_vec());
        let mut backend = SkyWatcherBackend::new(Box::new(fake.clone()));

        let outcome = backend
            .execute(&CommandKind::GoToAxisTarget(Axis::Primary, 12.5))
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Ack);
        assert_eq!(fake.sent.lock().unwrap()[0], b"S112.500000\r".to_vec());
    }

    #[test]
    fn decodes_error_response_as_mount_error() {
        let fake = FakeTransport::default();
        fake.responses.lock().unwrap().push_back(b"!1\r".to_vec());
        let mut backend = SkyWatcherBackend::new(Box::new(fake));

        let err = backend.execute(&CommandKind::GetControllerVoltage);
        assert!(err.is_err());
    }
}
