use std::fmt;

/// Milliseconds since the current session started.
pub type Timestamp = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId {
    pub controller: usize,
    pub pad: usize,
}

impl PadId {
    pub fn sipper_id(&self, pads_per_controller: usize) -> usize {
        self.controller * pads_per_controller + self.pad
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PadState {
    pub is_touching: bool,
    pub last_touch_start: Timestamp,
    pub last_touch_stop: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchKind {
    Start,
    Stop,
}

impl TouchKind {
    // Numeric state written to the log
    pub fn code(&self) -> u8 {
        match self {
            TouchKind::Start => 1,
            TouchKind::Stop => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TouchEvent {
    pub sipper_id: usize,
    pub timestamp: Timestamp,
    pub kind: TouchKind,
}

impl fmt::Display for TouchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} , {} , {}",
            self.sipper_id,
            self.timestamp,
            self.kind.code()
        )
    }
}

/// Per-pad state of one session, indexed by sipper id.
///
/// Sized once when the session is initialized and never resized.
#[derive(Clone, Debug)]
pub struct PadTable {
    pads: Box<[PadState]>,
    pads_per_controller: usize,
}

impl PadTable {
    pub fn new(controllers: usize, pads_per_controller: usize) -> Self {
        Self {
            pads: vec![PadState::default(); controllers * pads_per_controller].into_boxed_slice(),
            pads_per_controller,
        }
    }

    pub fn reset(&mut self) {
        self.pads.fill(PadState::default());
    }

    pub fn len(&self) -> usize {
        self.pads.len()
    }

    pub fn sipper_id(&self, id: PadId) -> usize {
        id.sipper_id(self.pads_per_controller)
    }

    pub fn get(&self, id: PadId) -> &PadState {
        &self.pads[self.sipper_id(id)]
    }

    pub fn get_mut(&mut self, id: PadId) -> &mut PadState {
        let index = self.sipper_id(id);
        &mut self.pads[index]
    }

    pub fn touching(&self) -> usize {
        self.pads.iter().filter(|p| p.is_touching).count()
    }
}
