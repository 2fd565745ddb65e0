//! Development mode: build from a single year of input.
//!
//! The full CPC archive covers several decades and a complete build takes
//! hours. With `--test` only the files of one year are read so the whole
//! pipeline can be exercised quickly.

/// Year read when development mode is on.
pub const DEV_INPUT_YEAR: i32 = 2010;

/// Which yearly input files (`data.{YEAR}.nc`) a build reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputYears {
    All,
    Only(i32),
}

/// Configuration for development mode input selection
pub struct DevMode {
    /// Year whose files are read
    pub input_year: i32,
}

impl DevMode {
    pub fn new(input_year: i32) -> Self {
        Self { input_year }
    }

    pub fn input_years(&self) -> InputYears {
        InputYears::Only(self.input_year)
    }
}

impl Default for DevMode {
    fn default() -> Self {
        Self::new(DEV_INPUT_YEAR)
    }
}

impl InputYears {
    /// Input selection for the `test` flag.
    pub fn from_test_flag(test: bool) -> Self {
        if test {
            DevMode::default().input_years()
        } else {
            InputYears::All
        }
    }

    /// Year encoded in a `data.{YEAR}.nc` file name, if it is selected.
    pub fn select(&self, file_name: &str) -> Option<i32> {
        let year: i32 = file_name
            .strip_prefix("data.")?
            .strip_suffix(".nc")?
            .parse()
            .ok()?;
        match self {
            InputYears::All => Some(year),
            InputYears::Only(only) => (year == *only).then_some(year),
        }
    }

    /// Human-readable file pattern, for messages.
    pub fn pattern(&self) -> String {
        match self {
            InputYears::All => "data.*.nc".to_string(),
            InputYears::Only(year) => format!("data.{}.nc", year),
        }
    }
}
