//! The `vNNN` version suffix used for recipe directories and patch results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipeVersion(pub u32);

impl RecipeVersion {
    pub fn initial() -> Self {
        RecipeVersion(1)
    }

    pub fn next(self) -> Self {
        RecipeVersion(self.0 + 1)
    }

    pub fn as_dir_name(&self) -> String {
        format!("v{:03}", self.0)
    }
}

impl fmt::Display for RecipeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{:03}", self.0)
    }
}

impl FromStr for RecipeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        digits
            .parse::<u32>()
            .map(RecipeVersion)
            .map_err(|_| format!("not a valid vNNN version: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        assert_eq!("v001".parse::<RecipeVersion>().unwrap(), RecipeVersion(1));
        assert_eq!(RecipeVersion(7).as_dir_name(), "v007");
    }

    #[test]
    fn increments_monotonically() {
        let v = RecipeVersion::initial();
        assert_eq!(v.next(), RecipeVersion(2));
        assert!(v < v.next());
    }
}
