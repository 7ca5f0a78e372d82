//! Statistical/scheduling distributions shared by the drop, misordering, latency/jitter,
//! duplication, and corruption impairments.
//!
//! Modeled as one tagged union: every variant knows its own parameters and its own
//! [`ScheduleMode`], and `emit_apply` / `load_from_response` are the two operations an
//! [`crate::impairment::ImpairmentManager`] drives.

use chimera_transport::{CommandToken, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DistributionError {
    #[error("{0:?} has a fixed {{1,0}} schedule and cannot be rescheduled")]
    FixedSchedule(DistributionKind),
    #[error("{0:?} uses {1:?} scheduling, not the operation attempted")]
    WrongScheduleMode(DistributionKind, ScheduleMode),
    #[error("malformed distribution response for {0:?}: {1}")]
    MalformedResponse(DistributionKind, &'static str),
}

/// How a distribution's [`Schedule`] may be mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Burst,
    NonBurst,
    FixedContinuous,
}

/// `{duration, period}`, units depend on the owning distribution: 10 ms increments for
/// packet-spacing distributions, 100 ns increments for latency distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub duration: u32,
    pub period: u32,
}

impl Schedule {
    pub const FIXED_CONTINUOUS: Schedule = Schedule { duration: 1, period: 0 };
}

/// Variant discriminant, independent of parameters — used as a table key and as the wire
/// field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionKind {
    FixedBurst,
    AccumulateBurst,
    RandomBurst,
    FixedRate,
    RandomRate,
    BitErrorRate,
    GilbertElliot,
    Uniform,
    Gaussian,
    Gamma,
    Poisson,
    Step,
    ConstantDelay,
    Custom,
}

impl DistributionKind {
    /// All fourteen variants, in the order used to break get() ties when no timestamp is
    /// available.
    pub const ALL: [DistributionKind; 14] = [
        DistributionKind::FixedBurst,
        DistributionKind::AccumulateBurst,
        DistributionKind::RandomBurst,
        DistributionKind::FixedRate,
        DistributionKind::RandomRate,
        DistributionKind::BitErrorRate,
        DistributionKind::GilbertElliot,
        DistributionKind::Uniform,
        DistributionKind::Gaussian,
        DistributionKind::Gamma,
        DistributionKind::Poisson,
        DistributionKind::Step,
        DistributionKind::ConstantDelay,
        DistributionKind::Custom,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            DistributionKind::FixedBurst => "fixed_burst",
            DistributionKind::AccumulateBurst => "accumulate_burst",
            DistributionKind::RandomBurst => "random_burst",
            DistributionKind::FixedRate => "fixed_rate",
            DistributionKind::RandomRate => "random_rate",
            DistributionKind::BitErrorRate => "bit_error_rate",
            DistributionKind::GilbertElliot => "gilbert_elliot",
            DistributionKind::Uniform => "uniform",
            DistributionKind::Gaussian => "gaussian",
            DistributionKind::Gamma => "gamma",
            DistributionKind::Poisson => "poisson",
            DistributionKind::Step => "step",
            DistributionKind::ConstantDelay => "constant_delay",
            DistributionKind::Custom => "custom",
        }
    }

    pub fn schedule_mode(&self) -> ScheduleMode {
        match self {
            DistributionKind::FixedBurst | DistributionKind::AccumulateBurst => ScheduleMode::Burst,
            DistributionKind::ConstantDelay => ScheduleMode::FixedContinuous,
            _ => ScheduleMode::NonBurst,
        }
    }
}

/// A configured distribution: parameters plus a schedule (fixed, for [`DistributionKind::ConstantDelay`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    FixedBurst { burst_size: u32, schedule: Schedule },
    AccumulateBurst { burst_delay: u32, schedule: Schedule },
    RandomBurst { min: u32, max: u32, probability_ppm: u32, schedule: Schedule },
    FixedRate { probability_ppm: u32, schedule: Schedule },
    RandomRate { probability_ppm: u32, schedule: Schedule },
    BitErrorRate { coefficient: u32, exponent: u32, schedule: Schedule },
    GilbertElliot {
        good_impair_ppm: u32,
        good_trans_ppm: u32,
        bad_impair_ppm: u32,
        bad_trans_ppm: u32,
        schedule: Schedule,
    },
    Uniform { min: u32, max: u32, schedule: Schedule },
    Gaussian { mean: u32, std_dev: u32, schedule: Schedule },
    Gamma { shape: u32, scale: u32, schedule: Schedule },
    Poisson { lambda: u32, schedule: Schedule },
    Step { min: u32, max: u32, schedule: Schedule },
    ConstantDelay { delay: u32 },
    Custom { custom_distribution_id: u8, schedule: Schedule },
}

impl Distribution {
    pub fn kind(&self) -> DistributionKind {
        match self {
            Distribution::FixedBurst { .. } => DistributionKind::FixedBurst,
            Distribution::AccumulateBurst { .. } => DistributionKind::AccumulateBurst,
            Distribution::RandomBurst { .. } => DistributionKind::RandomBurst,
            Distribution::FixedRate { .. } => DistributionKind::FixedRate,
            Distribution::RandomRate { .. } => DistributionKind::RandomRate,
            Distribution::BitErrorRate { .. } => DistributionKind::BitErrorRate,
            Distribution::GilbertElliot { .. } => DistributionKind::GilbertElliot,
            Distribution::Uniform { .. } => DistributionKind::Uniform,
            Distribution::Gaussian { .. } => DistributionKind::Gaussian,
            Distribution::Gamma { .. } => DistributionKind::Gamma,
            Distribution::Poisson { .. } => DistributionKind::Poisson,
            Distribution::Step { .. } => DistributionKind::Step,
            Distribution::ConstantDelay { .. } => DistributionKind::ConstantDelay,
            Distribution::Custom { .. } => DistributionKind::Custom,
        }
    }

    pub fn schedule(&self) -> Schedule {
        match self {
            Distribution::ConstantDelay { .. } => Schedule::FIXED_CONTINUOUS,
            Distribution::FixedBurst { schedule, .. }
            | Distribution::AccumulateBurst { schedule, .. }
            | Distribution::RandomBurst { schedule, .. }
            | Distribution::FixedRate { schedule, .. }
            | Distribution::RandomRate { schedule, .. }
            | Distribution::BitErrorRate { schedule, .. }
            | Distribution::GilbertElliot { schedule, .. }
            | Distribution::Uniform { schedule, .. }
            | Distribution::Gaussian { schedule, .. }
            | Distribution::Gamma { schedule, .. }
            | Distribution::Poisson { schedule, .. }
            | Distribution::Step { schedule, .. }
            | Distribution::Custom { schedule, .. } => *schedule,
        }
    }

    fn schedule_mut(&mut self) -> Option<&mut Schedule> {
        match self {
            Distribution::ConstantDelay { .. } => None,
            Distribution::FixedBurst { schedule, .. }
            | Distribution::AccumulateBurst { schedule, .. }
            | Distribution::RandomBurst { schedule, .. }
            | Distribution::FixedRate { schedule, .. }
            | Distribution::RandomRate { schedule, .. }
            | Distribution::BitErrorRate { schedule, .. }
            | Distribution::GilbertElliot { schedule, .. }
            | Distribution::Uniform { schedule, .. }
            | Distribution::Gaussian { schedule, .. }
            | Distribution::Gamma { schedule, .. }
            | Distribution::Poisson { schedule, .. }
            | Distribution::Step { schedule, .. }
            | Distribution::Custom { schedule, .. } => Some(schedule),
        }
    }

    fn require_mode(&self, mode: ScheduleMode) -> Result<(), DistributionError> {
        let actual = self.kind().schedule_mode();
        if actual == mode {
            Ok(())
        } else if actual == ScheduleMode::FixedContinuous {
            Err(DistributionError::FixedSchedule(self.kind()))
        } else {
            Err(DistributionError::WrongScheduleMode(self.kind(), actual))
        }
    }

    /// Burst-schedule operation: schedule becomes `{1,0}`.
    pub fn one_shot(&mut self) -> Result<(), DistributionError> {
        self.require_mode(ScheduleMode::Burst)?;
        *self.schedule_mut().expect("burst mode always carries a schedule") = Schedule { duration: 1, period: 0 };
        Ok(())
    }

    /// Burst-schedule operation: schedule becomes `{1,period}`.
    pub fn repeat(&mut self, period: u32) -> Result<(), DistributionError> {
        self.require_mode(ScheduleMode::Burst)?;
        *self.schedule_mut().expect("burst mode always carries a schedule") = Schedule { duration: 1, period };
        Ok(())
    }

    /// Non-burst-schedule operation: schedule becomes `{1,0}`.
    pub fn continuous(&mut self) -> Result<(), DistributionError> {
        self.require_mode(ScheduleMode::NonBurst)?;
        *self.schedule_mut().expect("non-burst mode always carries a schedule") = Schedule { duration: 1, period: 0 };
        Ok(())
    }

    /// Non-burst-schedule operation: schedule becomes `{duration,period}`.
    pub fn repeat_pattern(&mut self, duration: u32, period: u32) -> Result<(), DistributionError> {
        self.require_mode(ScheduleMode::NonBurst)?;
        *self.schedule_mut().expect("non-burst mode always carries a schedule") = Schedule { duration, period };
        Ok(())
    }

    /// Build the command sequence that configures this distribution on the device: the
    /// parameter write, then the schedule write (always emitted, even for the fixed `{1,0}` of
    /// ConstantDelay).
    pub fn emit_apply(&self, base_path: &str) -> Vec<CommandToken> {
        let kind = self.kind();
        let params_path = format!("{base_path}/distribution/{}", kind.field_name());
        let schedule_path = format!("{base_path}/schedule");
        let params = self.params_value();
        let schedule = self.schedule();
        vec![
            CommandToken::set("distribution", params_path, params),
            CommandToken::set(
                "schedule",
                schedule_path,
                Value::List(vec![Value::U32(schedule.duration), Value::U32(schedule.period)]),
            ),
        ]
    }

    fn params_value(&self) -> Value {
        match self {
            Distribution::FixedBurst { burst_size, .. } => Value::List(vec![Value::U32(*burst_size)]),
            Distribution::AccumulateBurst { burst_delay, .. } => Value::List(vec![Value::U32(*burst_delay)]),
            Distribution::RandomBurst { min, max, probability_ppm, .. } => {
                Value::List(vec![Value::U32(*min), Value::U32(*max), Value::U32(*probability_ppm)])
            }
            Distribution::FixedRate { probability_ppm, .. } => Value::List(vec![Value::U32(*probability_ppm)]),
            Distribution::RandomRate { probability_ppm, .. } => Value::List(vec![Value::U32(*probability_ppm)]),
            Distribution::BitErrorRate { coefficient, exponent, .. } => {
                Value::List(vec![Value::U32(*coefficient), Value::U32(*exponent)])
            }
            Distribution::GilbertElliot { good_impair_ppm, good_trans_ppm, bad_impair_ppm, bad_trans_ppm, .. } => {
                Value::List(vec![
                    Value::U32(*good_impair_ppm),
                    Value::U32(*good_trans_ppm),
                    Value::U32(*bad_impair_ppm),
                    Value::U32(*bad_trans_ppm),
                ])
            }
            Distribution::Uniform { min, max, .. } => Value::List(vec![Value::U32(*min), Value::U32(*max)]),
            Distribution::Gaussian { mean, std_dev, .. } => Value::List(vec![Value::U32(*mean), Value::U32(*std_dev)]),
            Distribution::Gamma { shape, scale, .. } => Value::List(vec![Value::U32(*shape), Value::U32(*scale)]),
            Distribution::Poisson { lambda, .. } => Value::List(vec![Value::U32(*lambda)]),
            Distribution::Step { min, max, .. } => Value::List(vec![Value::U32(*min), Value::U32(*max)]),
            Distribution::ConstantDelay { delay } => Value::List(vec![Value::U32(*delay)]),
            Distribution::Custom { custom_distribution_id, .. } => {
                Value::List(vec![Value::U32(*custom_distribution_id as u32)])
            }
        }
    }

    /// Reconstruct a distribution from a successful `get` response: the raw parameter list plus
    /// (for everything but ConstantDelay) the schedule response.
    pub fn load_from_response(
        kind: DistributionKind,
        params: &Value,
        schedule: Option<&Value>,
    ) -> Result<Distribution, DistributionError> {
        let nums: Vec<u32> = params
            .as_list()
            .ok_or(DistributionError::MalformedResponse(kind, "expected a parameter list"))?
            .iter()
            .map(|v| v.as_u32().ok_or(DistributionError::MalformedResponse(kind, "expected u32 parameter")))
            .collect::<Result<_, _>>()?;

        let schedule = if kind == DistributionKind::ConstantDelay {
            Schedule::FIXED_CONTINUOUS
        } else {
            let raw = schedule.ok_or(DistributionError::MalformedResponse(kind, "missing schedule response"))?;
            let parts = raw.as_list().ok_or(DistributionError::MalformedResponse(kind, "expected a schedule pair"))?;
            match parts {
                [d, p] => Schedule {
                    duration: d.as_u32().ok_or(DistributionError::MalformedResponse(kind, "bad duration"))?,
                    period: p.as_u32().ok_or(DistributionError::MalformedResponse(kind, "bad period"))?,
                },
                _ => return Err(DistributionError::MalformedResponse(kind, "schedule must have 2 fields")),
            }
        };

        let get = |i: usize| -> Result<u32, DistributionError> {
            nums.get(i).copied().ok_or(DistributionError::MalformedResponse(kind, "missing parameter"))
        };

        Ok(match kind {
            DistributionKind::FixedBurst => Distribution::FixedBurst { burst_size: get(0)?, schedule },
            DistributionKind::AccumulateBurst => Distribution::AccumulateBurst { burst_delay: get(0)?, schedule },
            DistributionKind::RandomBurst => {
                Distribution::RandomBurst { min: get(0)?, max: get(1)?, probability_ppm: get(2)?, schedule }
            }
            DistributionKind::FixedRate => Distribution::FixedRate { probability_ppm: get(0)?, schedule },
            DistributionKind::RandomRate => Distribution::RandomRate { probability_ppm: get(0)?, schedule },
            DistributionKind::BitErrorRate => {
                Distribution::BitErrorRate { coefficient: get(0)?, exponent: get(1)?, schedule }
            }
            DistributionKind::GilbertElliot => Distribution::GilbertElliot {
                good_impair_ppm: get(0)?,
                good_trans_ppm: get(1)?,
                bad_impair_ppm: get(2)?,
                bad_trans_ppm: get(3)?,
                schedule,
            },
            DistributionKind::Uniform => Distribution::Uniform { min: get(0)?, max: get(1)?, schedule },
            DistributionKind::Gaussian => Distribution::Gaussian { mean: get(0)?, std_dev: get(1)?, schedule },
            DistributionKind::Gamma => Distribution::Gamma { shape: get(0)?, scale: get(1)?, schedule },
            DistributionKind::Poisson => Distribution::Poisson { lambda: get(0)?, schedule },
            DistributionKind::Step => Distribution::Step { min: get(0)?, max: get(1)?, schedule },
            DistributionKind::ConstantDelay => Distribution::ConstantDelay { delay: get(0)? },
            DistributionKind::Custom => {
                Distribution::Custom { custom_distribution_id: get(0)? as u8, schedule }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_burst() -> Distribution {
        Distribution::FixedBurst { burst_size: 5, schedule: Schedule { duration: 1, period: 0 } }
    }

    #[test]
    fn one_shot_sets_fixed_schedule() {
        let mut d = sample_burst();
        d.repeat(7).unwrap();
        assert_eq!(d.schedule(), Schedule { duration: 1, period: 7 });
        d.one_shot().unwrap();
        assert_eq!(d.schedule(), Schedule { duration: 1, period: 0 });
    }

    #[test]
    fn non_burst_rejects_burst_ops() {
        let mut d = Distribution::Uniform { min: 1, max: 2, schedule: Schedule { duration: 1, period: 0 } };
        assert!(d.one_shot().is_err());
        d.repeat_pattern(3, 4).unwrap();
        assert_eq!(d.schedule(), Schedule { duration: 3, period: 4 });
    }

    #[test]
    fn constant_delay_schedule_is_immutable() {
        let mut d = Distribution::ConstantDelay { delay: 100_000 };
        assert_eq!(d.schedule(), Schedule::FIXED_CONTINUOUS);
        assert!(d.continuous().is_err());
        assert!(d.one_shot().is_err());
    }

    #[test]
    fn round_trips_through_emit_and_load() {
        let d = Distribution::GilbertElliot {
            good_impair_ppm: 10,
            good_trans_ppm: 20,
            bad_impair_ppm: 30,
            bad_trans_ppm: 40,
            schedule: Schedule { duration: 1, period: 0 },
        };
        let tokens = d.emit_apply("flow");
        let params = match &tokens[0].command {
            chimera_transport::Command::Set(_, v) => v.clone(),
            _ => panic!("expected a set command"),
        };
        let schedule = match &tokens[1].command {
            chimera_transport::Command::Set(_, v) => v.clone(),
            _ => panic!("expected a set command"),
        };
        let reloaded = Distribution::load_from_response(d.kind(), &params, Some(&schedule)).unwrap();
        assert_eq!(reloaded, d);
    }
}
