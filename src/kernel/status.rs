use core::fmt;

/// Progress of one boot phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

pub const DESCRIPTOR_TABLES: &str = "Descriptor tables";
pub const PAGING: &str = "Paging";
pub const INTERRUPT_CONTROLLER: &str = "Interrupt controller";
pub const TIMER: &str = "Timer";

pub const PHASES: [&str; 4] = [DESCRIPTOR_TABLES, PAGING, INTERRUPT_CONTROLLER, TIMER];

/// Status of every boot phase, in boot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBoard {
    components: [ComponentStatus; PHASES.len()],
}

impl StatusBoard {
    pub const fn new() -> Self {
        Self {
            components: [
                ComponentStatus::new(DESCRIPTOR_TABLES),
                ComponentStatus::new(PAGING),
                ComponentStatus::new(INTERRUPT_CONTROLLER),
                ComponentStatus::new(TIMER),
            ],
        }
    }

    /// Unknown names are ignored.
    pub fn update(&mut self, name: &str, status: InitStatus) {
        if let Some(component) = self.components.iter_mut().find(|c| c.name == name) {
            component.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<InitStatus> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.components.iter()
    }

    pub fn all_ready(&self) -> bool {
        self.components.iter().all(ComponentStatus::is_complete)
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_started() {
        let board = StatusBoard::new();
        assert!(board.iter().all(|c| c.status == InitStatus::NotStarted));
        assert!(!board.all_ready());
    }

    #[test]
    fn updates_by_name() {
        let mut board = StatusBoard::new();
        board.update(PAGING, InitStatus::Failed("no tables"));
        board.update("Sound", InitStatus::Completed);
        assert_eq!(board.get(PAGING), Some(InitStatus::Failed("no tables")));
        assert_eq!(board.get("Sound"), None);
        assert_eq!(InitStatus::Failed("no tables").to_string(), "Failed: no tables");
    }
}
