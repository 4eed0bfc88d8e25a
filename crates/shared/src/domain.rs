use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(AnalysisId);

/// The three genomic data categories a session tracks one file for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenomicKind {
    Dna,
    Rna,
    Mirna,
}

impl GenomicKind {
    pub const ALL: [GenomicKind; 3] = [GenomicKind::Dna, GenomicKind::Rna, GenomicKind::Mirna];

    pub fn as_str(self) -> &'static str {
        match self {
            GenomicKind::Dna => "dna",
            GenomicKind::Rna => "rna",
            GenomicKind::Mirna => "mirna",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GenomicKind::Dna => "DNA",
            GenomicKind::Rna => "RNA",
            GenomicKind::Mirna => "miRNA",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GenomicKind::Dna => "DNA sequencing data (.parquet)",
            GenomicKind::Rna => "RNA expression data (.parquet)",
            GenomicKind::Mirna => "miRNA profile data (.parquet)",
        }
    }
}

impl fmt::Display for GenomicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown genomic data kind '{0}'")]
pub struct UnknownGenomicKind(pub String);

impl FromStr for GenomicKind {
    type Err = UnknownGenomicKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dna" => Ok(GenomicKind::Dna),
            "rna" => Ok(GenomicKind::Rna),
            "mirna" => Ok(GenomicKind::Mirna),
            _ => Err(UnknownGenomicKind(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "low risk")]
    Low,
    #[serde(rename = "high risk")]
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low risk",
            RiskLevel::High => "high risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// Data behind a transient user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }
}
