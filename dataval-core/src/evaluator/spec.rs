//! Serializable evaluator descriptions, as written in `[[evaluators]]` tables.

use crate::error::DatavalError;
use crate::evaluator::{
    Ame, BetaShapley, DataBanzhaf, DataEvaluator, DataOob, DataShapley, InfluenceSubsample,
    KnnShapley, LeaveOneOut, RandomEvaluator, ShapleySampler,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorSpec {
    Random,
    LeaveOneOut,
    DataShapley {
        #[serde(default = "default_mc_epochs")]
        mc_epochs: usize,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
        #[serde(default = "default_gr_threshold")]
        gr_threshold: f64,
    },
    BetaShapley {
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default = "default_beta")]
        beta: f64,
        #[serde(default = "default_mc_epochs")]
        mc_epochs: usize,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
        #[serde(default = "default_gr_threshold")]
        gr_threshold: f64,
    },
    DataBanzhaf {
        #[serde(default = "default_num_models")]
        num_models: usize,
    },
    Ame {
        #[serde(default = "default_num_models")]
        num_models: usize,
    },
    DataOob {
        #[serde(default = "default_num_models")]
        num_models: usize,
        #[serde(default = "default_oob_proportion")]
        proportion: f64,
    },
    KnnShapley {
        #[serde(default = "default_k_neighbors")]
        k_neighbors: usize,
    },
    InfluenceSubsample {
        #[serde(default = "default_num_models")]
        num_models: usize,
        #[serde(default = "default_influence_proportion")]
        proportion: f64,
    },
}

fn default_mc_epochs() -> usize {
    ShapleySampler::default().mc_epochs
}

fn default_min_samples() -> usize {
    ShapleySampler::default().min_samples
}

fn default_gr_threshold() -> f64 {
    ShapleySampler::default().gr_threshold
}

fn default_alpha() -> f64 {
    BetaShapley::DEFAULT_ALPHA
}

fn default_beta() -> f64 {
    BetaShapley::DEFAULT_BETA
}

fn default_num_models() -> usize {
    10
}

fn default_oob_proportion() -> f64 {
    DataOob::DEFAULT_PROPORTION
}

fn default_k_neighbors() -> usize {
    KnnShapley::DEFAULT_K
}

fn default_influence_proportion() -> f64 {
    InfluenceSubsample::DEFAULT_PROPORTION
}

impl EvaluatorSpec {
    /// Every accepted `kind` value.
    pub const KINDS: [&'static str; 9] = [
        "random",
        "leave_one_out",
        "data_shapley",
        "beta_shapley",
        "data_banzhaf",
        "ame",
        "data_oob",
        "knn_shapley",
        "influence_subsample",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::LeaveOneOut => "leave_one_out",
            Self::DataShapley { .. } => "data_shapley",
            Self::BetaShapley { .. } => "beta_shapley",
            Self::DataBanzhaf { .. } => "data_banzhaf",
            Self::Ame { .. } => "ame",
            Self::DataOob { .. } => "data_oob",
            Self::KnnShapley { .. } => "knn_shapley",
            Self::InfluenceSubsample { .. } => "influence_subsample",
        }
    }

    /// One-line description for `dataval evaluators`.
    pub fn describe(kind: &str) -> Option<&'static str> {
        Some(match kind {
            "random" => "uniform random values; baseline",
            "leave_one_out" => "utility drop when a single point is removed",
            "data_shapley" => "truncated Monte-Carlo Shapley with Gelman-Rubin stopping",
            "beta_shapley" => "Shapley marginals reweighted by a Beta(alpha, beta) prior",
            "data_banzhaf" => "mean utility with minus without, over random half subsets",
            "ame" => "Lasso on subset inclusion at p in {0.2, 0.4, 0.6, 0.8}",
            "data_oob" => "out-of-bag correctness of bootstrap models",
            "knn_shapley" => "closed-form Shapley of a K-nearest-neighbour classifier",
            "influence_subsample" => "subsample influence at a fixed proportion",
            _ => return None,
        })
    }

    pub fn build(&self) -> Result<Box<dyn DataEvaluator>, DatavalError> {
        Ok(match *self {
            Self::Random => Box::new(RandomEvaluator::new()),
            Self::LeaveOneOut => Box::new(LeaveOneOut::new()),
            Self::DataShapley {
                mc_epochs,
                min_samples,
                gr_threshold,
            } => Box::new(DataShapley::new(ShapleySampler {
                mc_epochs,
                min_samples,
                gr_threshold,
                ..ShapleySampler::default()
            })?),
            Self::BetaShapley {
                alpha,
                beta,
                mc_epochs,
                min_samples,
                gr_threshold,
            } => Box::new(BetaShapley::new(
                alpha,
                beta,
                ShapleySampler {
                    mc_epochs,
                    min_samples,
                    gr_threshold,
                    ..ShapleySampler::default()
                },
            )?),
            Self::DataBanzhaf { num_models } => Box::new(DataBanzhaf::new(num_models)?),
            Self::Ame { num_models } => Box::new(Ame::new(num_models)?),
            Self::DataOob {
                num_models,
                proportion,
            } => Box::new(DataOob::new(num_models, proportion)?),
            Self::KnnShapley { k_neighbors } => Box::new(KnnShapley::new(k_neighbors)?),
            Self::InfluenceSubsample {
                num_models,
                proportion,
            } => Box::new(InfluenceSubsample::new(num_models, proportion)?),
        })
    }

    /// The evaluator line-up used when nothing is configured.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::Random,
            Self::DataBanzhaf { num_models: 10 },
            Self::Ame { num_models: 10 },
            Self::DataOob {
                num_models: 10,
                proportion: DataOob::DEFAULT_PROPORTION,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Deserialize)]
    struct Wrapper {
        evaluators: Vec<EvaluatorSpec>,
    }

    #[test]
    fn test_parse_tagged_tables() {
        let parsed: Wrapper = toml::from_str(
            r#"
            [[evaluators]]
            kind = "random"

            [[evaluators]]
            kind = "data_banzhaf"
            num_models = 25

            [[evaluators]]
            kind = "data_oob"
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.evaluators,
            vec![
                EvaluatorSpec::Random,
                EvaluatorSpec::DataBanzhaf { num_models: 25 },
                EvaluatorSpec::DataOob {
                    num_models: 10,
                    proportion: 1.0
                },
            ]
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let parsed: Result<Wrapper, _> = toml::from_str("[[evaluators]]\nkind = \"dvrl\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_defaults_identities() {
        let names: Vec<String> = EvaluatorSpec::defaults()
            .iter()
            .map(|spec| spec.build().unwrap().name())
            .collect();
        assert_eq!(
            names,
            vec![
                "RandomEvaluator",
                "DataBanzhaf(num_models=10)",
                "AME(num_models=10)",
                "DataOob(num_models=10,proportion=1)",
            ]
        );
    }

    #[test]
    fn test_differently_configured_evaluators_have_distinct_identities() {
        let specs = [
            EvaluatorSpec::DataOob { num_models: 10, proportion: 1.0 },
            EvaluatorSpec::DataOob { num_models: 10, proportion: 0.5 },
            EvaluatorSpec::InfluenceSubsample { num_models: 10, proportion: 0.7 },
            EvaluatorSpec::InfluenceSubsample { num_models: 10, proportion: 0.5 },
            EvaluatorSpec::DataShapley { mc_epochs: 100, min_samples: 20, gr_threshold: 1.05 },
            EvaluatorSpec::DataShapley { mc_epochs: 100, min_samples: 40, gr_threshold: 1.05 },
            EvaluatorSpec::DataShapley { mc_epochs: 100, min_samples: 20, gr_threshold: 1.1 },
            EvaluatorSpec::BetaShapley {
                alpha: 4.0,
                beta: 1.0,
                mc_epochs: 100,
                min_samples: 20,
                gr_threshold: 1.05,
            },
            EvaluatorSpec::BetaShapley {
                alpha: 4.0,
                beta: 1.0,
                mc_epochs: 50,
                min_samples: 20,
                gr_threshold: 1.05,
            },
        ];
        let mut names: Vec<String> = specs.iter().map(|s| s.build().unwrap().name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn test_every_kind_is_described_and_round_trips() {
        for kind in EvaluatorSpec::KINDS {
            assert!(EvaluatorSpec::describe(kind).is_some(), "{kind}");
            let spec: EvaluatorSpec =
                serde_json::from_value(serde_json::json!({ "kind": kind })).unwrap();
            assert_eq!(spec.kind(), kind);
            assert!(spec.build().is_ok());
        }
    }

    #[test]
    fn test_invalid_parameters_fail_at_build() {
        assert!(EvaluatorSpec::DataBanzhaf { num_models: 0 }.build().is_err());
        assert!(
            EvaluatorSpec::InfluenceSubsample {
                num_models: 3,
                proportion: 2.0
            }
            .build()
            .is_err()
        );
    }
}
