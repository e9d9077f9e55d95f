use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A numbered season or the film sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Number(u32),
    Film,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSeasonError(String);

impl fmt::Display for ParseSeasonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid season '{}': expected a positive number or 'фильм'", self.0)
    }
}

impl std::error::Error for ParseSeasonError {}

impl Season {
    /// Value persisted in the `season` column.
    pub fn as_db(&self) -> String {
        match self {
            Season::Number(n) => n.to_string(),
            Season::Film => "film".to_string(),
        }
    }

    /// Button label on the season screen.
    pub fn label(&self) -> String {
        match self {
            Season::Number(n) => format!("Сезон {n}"),
            Season::Film => "🎬 Фильм".to_string(),
        }
    }

    /// Line used in admin reports.
    pub fn report_line(&self) -> String {
        match self {
            Season::Number(n) => format!("📺 Сезон: {n}"),
            Season::Film => "🎬 Фильм".to_string(),
        }
    }

    pub fn episode_caption(&self, episode: u32) -> String {
        match self {
            Season::Number(n) => format!("{n} сезон {episode} серия"),
            Season::Film => format!("Фильм, часть {episode}"),
        }
    }
}

impl FromStr for Season {
    type Err = ParseSeasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "фильм" | "film" | "movie" => Ok(Season::Film),
            other => match other.parse::<u32>() {
                Ok(n) if n > 0 => Ok(Season::Number(n)),
                _ => Err(ParseSeasonError(s.trim().to_string())),
            },
        }
    }
}

impl Ord for Season {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Season::Number(a), Season::Number(b)) => a.cmp(b),
            (Season::Number(_), Season::Film) => Ordering::Less,
            (Season::Film, Season::Number(_)) => Ordering::Greater,
            (Season::Film, Season::Film) => Ordering::Equal,
        }
    }
}

impl PartialOrd for Season {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
