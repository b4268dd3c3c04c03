use std::fmt;

use serde::{Deserialize, Serialize};

/// Disease categories the classifier was trained on.
///
/// The discriminant order is the model's output order; index `i` of the
/// probability vector belongs to `EyeDisease::ALL[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeDisease {
    Cataract,
    DiabeticRetinopathy,
    Glaucoma,
    Normal,
}

impl EyeDisease {
    pub const ALL: [EyeDisease; 4] = [
        EyeDisease::Cataract,
        EyeDisease::DiabeticRetinopathy,
        EyeDisease::Glaucoma,
        EyeDisease::Normal,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EyeDisease::Cataract => "cataract",
            EyeDisease::DiabeticRetinopathy => "diabetic_retinopathy",
            EyeDisease::Glaucoma => "glaucoma",
            EyeDisease::Normal => "normal",
        }
    }
}

impl fmt::Display for EyeDisease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
