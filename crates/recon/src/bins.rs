//! Fixed histogram of `count_a - count_b`.
//!
//! | Bin          | Difference |
//! |--------------|------------|
//! | `less`       | < 0        |
//! | `equal`      | 0          |
//! | `+1..+4`     | 1 to 4     |
//! | `+5..+10`    | 5 to 10    |
//! | `+11..+20`   | 11 to 20   |
//! | `+21..+50`   | 21 to 50   |
//! | `+51..+100`  | 51 to 100  |
//! | `+101..+150` … `+451..+500` | 50-wide steps |
//! | `>+500`      | > 500      |

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiffBin {
    Less,
    Equal,
    More1To4,
    More5To10,
    More11To20,
    More21To50,
    More51To100,
    More101To150,
    More151To200,
    More201To250,
    More251To300,
    More301To350,
    More351To400,
    More401To450,
    More451To500,
    MoreThan500,
}

pub const BIN_COUNT: usize = 16;

/// Upper bound (inclusive) of each bounded positive bin, ascending.
const POSITIVE_BINS: [(DiffBin, i64); 13] = [
    (DiffBin::More1To4, 4),
    (DiffBin::More5To10, 10),
    (DiffBin::More11To20, 20),
    (DiffBin::More21To50, 50),
    (DiffBin::More51To100, 100),
    (DiffBin::More101To150, 150),
    (DiffBin::More151To200, 200),
    (DiffBin::More201To250, 250),
    (DiffBin::More251To300, 300),
    (DiffBin::More301To350, 350),
    (DiffBin::More351To400, 400),
    (DiffBin::More401To450, 450),
    (DiffBin::More451To500, 500),
];

impl DiffBin {
    /// Every bin, in report order.
    pub const ALL: [DiffBin; BIN_COUNT] = [
        DiffBin::Less,
        DiffBin::Equal,
        DiffBin::More1To4,
        DiffBin::More5To10,
        DiffBin::More11To20,
        DiffBin::More21To50,
        DiffBin::More51To100,
        DiffBin::More101To150,
        DiffBin::More151To200,
        DiffBin::More201To250,
        DiffBin::More251To300,
        DiffBin::More301To350,
        DiffBin::More351To400,
        DiffBin::More401To450,
        DiffBin::More451To500,
        DiffBin::MoreThan500,
    ];

    /// Position in [`DiffBin::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inclusive bounds; `None` means unbounded on that side.
    pub fn bounds(self) -> (Option<i64>, Option<i64>) {
        match self {
            Self::Less => (None, Some(-1)),
            Self::Equal => (Some(0), Some(0)),
            Self::MoreThan500 => (Some(501), None),
            bounded => {
                let pos = POSITIVE_BINS
                    .iter()
                    .position(|(bin, _)| *bin == bounded)
                    .unwrap_or(0);
                let lower = if pos == 0 { 1 } else { POSITIVE_BINS[pos - 1].1 + 1 };
                (Some(lower), Some(POSITIVE_BINS[pos].1))
            }
        }
    }

    pub fn contains(self, diff: i64) -> bool {
        let (lower, upper) = self.bounds();
        lower.map_or(true, |lo| diff >= lo) && upper.map_or(true, |hi| diff <= hi)
    }

    /// Stable machine key (JSON).
    pub fn key(self) -> &'static str {
        match self {
            Self::Less => "less",
            Self::Equal => "equal",
            Self::More1To4 => "more_1_to_4",
            Self::More5To10 => "more_5_to_10",
            Self::More11To20 => "more_11_to_20",
            Self::More21To50 => "more_21_to_50",
            Self::More51To100 => "more_51_to_100",
            Self::More101To150 => "more_101_to_150",
            Self::More151To200 => "more_151_to_200",
            Self::More201To250 => "more_201_to_250",
            Self::More251To300 => "more_251_to_300",
            Self::More301To350 => "more_301_to_350",
            Self::More351To400 => "more_351_to_400",
            Self::More401To450 => "more_401_to_450",
            Self::More451To500 => "more_451_to_500",
            Self::MoreThan500 => "more_than_500",
        }
    }

    /// Whether identifiers landing here are listed as offenders.
    /// `equal` and `less` are only counted.
    pub fn tracks_offenders(self) -> bool {
        !matches!(self, Self::Less | Self::Equal)
    }
}

impl std::fmt::Display for DiffBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bounds() {
            (None, _) => write!(f, "less"),
            (Some(0), Some(0)) => write!(f, "equal"),
            (Some(lo), Some(hi)) => write!(f, "+{lo}..+{hi}"),
            (Some(lo), None) => write!(f, ">+{}", lo - 1),
        }
    }
}

impl Serialize for DiffBin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// Map a signed difference to its bin. Total over `i64`.
pub fn classify(diff: i64) -> DiffBin {
    if diff < 0 {
        return DiffBin::Less;
    }
    if diff == 0 {
        return DiffBin::Equal;
    }
    POSITIVE_BINS
        .iter()
        .find(|(_, upper)| diff <= *upper)
        .map(|(bin, _)| *bin)
        .unwrap_or(DiffBin::MoreThan500)
}
