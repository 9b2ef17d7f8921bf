//! Catalog of cluster-validity criteria.
#![allow(clippy::must_use_candidate)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether a criterion is best at its maximum or its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// Identifier of one validity criterion.
///
/// The declaration order is the column order of every criteria vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CriterionId {
    CalinskiHarabasz,
    CalinskiHarabaszDerivRobust,
    CIndex,
    CIndexDerivRobust,
    CrossValidation,
    DaviesBouldin,
    DaviesBouldinDerivRobust,
    Dunn,
    DunnRobust,
    DunnRobustDerivRobust,
    Gamma,
    GammaDeriv,
    GPlus,
    Tau,
    KrzanowskiLai,
    KrzanowskiLaiC,
    McClain,
    PointBiserial,
    PointBiserialDerivRobust,
    Ratkowski,
    Silhouettes,
    SilhouettesDerivRobust,
    TraceW,
    TraceWDerivRobust,
}

impl CriterionId {
    /// Every criterion, in column order.
    pub const ALL: [CriterionId; 24] = [
        CriterionId::CalinskiHarabasz,
        CriterionId::CalinskiHarabaszDerivRobust,
        CriterionId::CIndex,
        CriterionId::CIndexDerivRobust,
        CriterionId::CrossValidation,
        CriterionId::DaviesBouldin,
        CriterionId::DaviesBouldinDerivRobust,
        CriterionId::Dunn,
        CriterionId::DunnRobust,
        CriterionId::DunnRobustDerivRobust,
        CriterionId::Gamma,
        CriterionId::GammaDeriv,
        CriterionId::GPlus,
        CriterionId::Tau,
        CriterionId::KrzanowskiLai,
        CriterionId::KrzanowskiLaiC,
        CriterionId::McClain,
        CriterionId::PointBiserial,
        CriterionId::PointBiserialDerivRobust,
        CriterionId::Ratkowski,
        CriterionId::Silhouettes,
        CriterionId::SilhouettesDerivRobust,
        CriterionId::TraceW,
        CriterionId::TraceWDerivRobust,
    ];

    /// Number of criteria, i.e. the length of a criteria vector.
    pub const COUNT: usize = Self::ALL.len();

    /// Column of this criterion.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            CriterionId::CalinskiHarabasz => "Calinski-Harabasz",
            CriterionId::CalinskiHarabaszDerivRobust => "Calinski-Harabasz Derivative Robust",
            CriterionId::CIndex => "C-Index",
            CriterionId::CIndexDerivRobust => "C-Index Derivative Robust",
            CriterionId::CrossValidation => "Cross-Validation",
            CriterionId::DaviesBouldin => "Davies-Bouldin",
            CriterionId::DaviesBouldinDerivRobust => "Davies-Bouldin Derivative Robust",
            CriterionId::Dunn => "Dunn",
            CriterionId::DunnRobust => "Dunn Robust",
            CriterionId::DunnRobustDerivRobust => "Dunn Robust Derivative Robust",
            CriterionId::Gamma => "Gamma",
            CriterionId::GammaDeriv => "Gamma Derivative",
            CriterionId::GPlus => "G(+)",
            CriterionId::Tau => "Tau",
            CriterionId::KrzanowskiLai => "Krzanowski-Lai",
            CriterionId::KrzanowskiLaiC => "Krzanowski-Lai C",
            CriterionId::McClain => "McClain",
            CriterionId::PointBiserial => "Point-Biserial",
            CriterionId::PointBiserialDerivRobust => "Point-Biserial Derivative Robust",
            CriterionId::Ratkowski => "Ratkowski",
            CriterionId::Silhouettes => "Silhouettes",
            CriterionId::SilhouettesDerivRobust => "Silhouettes Derivative Robust",
            CriterionId::TraceW => "Trace W",
            CriterionId::TraceWDerivRobust => "Trace W Derivative Robust",
        }
    }

    /// Which extreme is best.
    pub fn direction(self) -> Direction {
        match self {
            CriterionId::CIndex
            | CriterionId::CrossValidation
            | CriterionId::DaviesBouldin
            | CriterionId::GPlus
            | CriterionId::McClain
            | CriterionId::TraceW => Direction::Minimize,
            _ => Direction::Maximize,
        }
    }

    /// Smallest cluster count for which the criterion is defined.
    pub fn min_clusters(self) -> usize {
        match self {
            CriterionId::KrzanowskiLaiC => 3,
            _ => 2,
        }
    }

    /// Whether the criterion can be computed with `clusters` clusters.
    pub fn is_applicable(self, clusters: usize) -> bool {
        clusters >= self.min_clusters()
    }

    /// Base criterion this one is derived from across cluster counts.
    pub fn derived_from(self) -> Option<CriterionId> {
        match self {
            CriterionId::CalinskiHarabaszDerivRobust => Some(CriterionId::CalinskiHarabasz),
            CriterionId::CIndexDerivRobust => Some(CriterionId::CIndex),
            CriterionId::DaviesBouldinDerivRobust => Some(CriterionId::DaviesBouldin),
            CriterionId::DunnRobustDerivRobust => Some(CriterionId::DunnRobust),
            CriterionId::GammaDeriv => Some(CriterionId::Gamma),
            CriterionId::PointBiserialDerivRobust => Some(CriterionId::PointBiserial),
            CriterionId::SilhouettesDerivRobust => Some(CriterionId::Silhouettes),
            CriterionId::TraceWDerivRobust => Some(CriterionId::TraceW),
            _ => None,
        }
    }

    /// Whether the value needs neighbouring cluster counts.
    pub fn is_cross_count(self) -> bool {
        self.derived_from().is_some()
            || matches!(self, CriterionId::KrzanowskiLai | CriterionId::KrzanowskiLaiC)
    }

    /// Looks a criterion up by its display name, ignoring case.
    pub fn from_name(name: &str) -> Option<CriterionId> {
        Self::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
    }
}
