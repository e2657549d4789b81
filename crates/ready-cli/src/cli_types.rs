use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliInstallStrategy {
    Auto,
    Isolated,
    Colocated,
    System,
}

impl CliInstallStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Isolated => "isolated",
            Self::Colocated => "colocated",
            Self::System => "system",
        }
    }
}
