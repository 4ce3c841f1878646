use crate::calendar::Calendar;
use std::path::PathBuf;

/// Everything a run needs to know about where to read and write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The currency addon's saved-variables file.
    pub save_file: PathBuf,
    /// The crafting addon's saved-variables file, if any.
    pub crafting_file: Option<PathBuf>,
    /// Archive root.
    pub output: PathBuf,
    pub calendar: Calendar,
    /// Carry gold balances forward up to today.
    pub through_today: bool,
    pub chart: bool,
    /// How many recent gold days the report keeps.
    pub recent: usize,
}

impl Config {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(save_file: P, output: Q) -> Config {
        Config {
            save_file: save_file.into(),
            crafting_file: None,
            output: output.into(),
            calendar: Calendar::default(),
            through_today: false,
            chart: true,
            recent: 10,
        }
    }
}
