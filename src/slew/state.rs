/// Slew state machine states: `Idle → Setup → Moving → Completing → Idle`,
/// with `Moving` able to divert to `Cancelling` on cancellation before
/// returning to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlewState {
    Idle = 0,
    Setup = 1,
    Moving = 2,
    Completing = 3,
    Cancelling = 4,
}

impl SlewState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => SlewState::Idle,
            1 => SlewState::Setup,
            2 => SlewState::Moving,
            3 => SlewState::Completing,
            4 => SlewState::Cancelling,
            _ => unreachable!("invalid slew state byte"),
        }
    }
}
