#[derive(Debug, thiserror::Error)]
pub enum NodeNameError {
    #[error("node name length must be less than 256, but got {size} characters")]
    TooLongName { size: usize },

    #[error("node name must contain an '@' character")]
    MissingAtmark,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName {
    name: String,
    host: String,
}

impl NodeName {
    pub fn new(name: &str, host: &str) -> Result<Self, NodeNameError> {
        let size = name.len() + 1 + host.len();
        if size > 255 {
            Err(NodeNameError::TooLongName { size })
        } else {
            Ok(Self {
                name: name.to_owned(),
                host: host.to_owned(),
            })
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl std::str::FromStr for NodeName {
    type Err = NodeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.splitn(2, '@');
        if let (Some(name), Some(host)) = (tokens.next(), tokens.next()) {
            Self::new(name, host)
        } else {
            Err(NodeNameError::MissingAtmark)
        }
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

/// Type of a distributed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NodeType {
    /// Hidden node (C-node).
    Hidden = 72,

    /// Normal Erlang node.
    Normal = 77,
}

impl TryFrom<u8> for NodeType {
    type Error = crate::epmd::EpmdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            72 => Ok(Self::Hidden),
            77 => Ok(Self::Normal),
            _ => Err(crate::epmd::EpmdError::UnknownNodeType { value }),
        }
    }
}

/// Distinguishes successive incarnations of a node registered under the
/// same name. `erl` hands one out via EPMD on registration; a node that
/// hasn't registered yet (e.g. is only initiating connections) mints its
/// own at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Creation(pub u32);

impl Creation {
    pub fn new(v: u32) -> Self {
        Creation(v)
    }

    /// A small nonzero creation, matching what a freshly booted `erl`
    /// instance picks before it has talked to EPMD.
    pub fn random() -> Self {
        use rand::Rng as _;
        Creation(rand::thread_rng().gen_range(1..=3))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Creation {
    fn from(v: u32) -> Self {
        Creation(v)
    }
}

impl std::fmt::Display for Creation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity a node presents to peers during the distribution
/// handshake: its name, its current incarnation, and the distribution
/// capabilities it offers.
#[derive(Debug, Clone)]
pub struct LocalNode {
    pub name: NodeName,
    pub creation: Creation,
    pub flags: crate::flags::DistributionFlags,
}

impl LocalNode {
    pub fn new(name: NodeName, creation: Creation) -> Self {
        Self {
            name,
            creation,
            flags: crate::flags::DistributionFlags::mandatory(),
        }
    }
}
