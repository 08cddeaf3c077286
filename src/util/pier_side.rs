/// Which side of the mount the telescope is on (glossary "Side of pier");
/// matters for meridian-flip logic on German-equatorial mounts.
#[derive(Debug, Eq, PartialEq, Copy, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PierSide {
    Normal,
    ThroughThePole,
    Unknown,
}

impl PierSide {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Unknown => self,
            Self::Normal => Self::ThroughThePole,
            Self::ThroughThePole => Self::Normal,
        }
    }
}
