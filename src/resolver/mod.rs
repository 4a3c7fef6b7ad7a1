//! Feature-to-engine resolution
//!
//! One call to [`Resolver::resolve_pass`] turns the current feature pipe into
//! one submission: rules decide where every feature may run, aggregation
//! picks the engines for the pass, assignment tags the features, handlers
//! move them into the executed pipe and the resources step decides what the
//! pass writes. Whatever did not run stays in the feature pipe for the next
//! pass.

mod aggregate;
mod assign;
pub mod exec_caps;
mod finalize;
mod handler;
mod rules;
pub mod session;

pub use exec_caps::{EngineSet, ExecuteCaps};
pub use session::{HdrLuminance, SessionContext, SharedSession};

use crate::caps::HwCaps;
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::pipe::{Pipe, PipeShape, Request};
use crate::types::Surface;
use rules::RuleContext;
use tracing::{debug, info};

/// Decision for the next pass, without touching the feature pipe
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub caps: ExecuteCaps,
    /// Indexes of the layers processed by the pass
    pub layers: Vec<usize>,
    /// Copy of the feature pipe with every feature resolved and tagged
    pub pipe: Pipe,
}

/// One hardware submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub caps: ExecuteCaps,
    pub engines: EngineSet,
    /// Surfaces and features run by this submission
    pub executed: Pipe,
    /// Request indexes of the executed layers
    pub linked_layers: Vec<usize>,
    /// Surface written for the following pass
    pub intermediate: Option<Surface>,
}

impl Submission {
    pub fn is_last(&self) -> bool {
        self.caps.last_submission
    }
}

/// Resolves feature pipes against one set of hardware capabilities
#[derive(Debug, Clone)]
pub struct Resolver {
    caps: HwCaps,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(caps: HwCaps) -> Self {
        Self {
            caps,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(caps: HwCaps, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { caps, config })
    }

    pub fn caps(&self) -> &HwCaps {
        &self.caps
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Decide the next pass. Calling it twice on the same pipe and session
    /// gives the same plan.
    pub fn build_execute_caps(&self, pipe: &Pipe, session: &SessionContext) -> Result<Plan> {
        if pipe.shape() == PipeShape::OneToMany {
            return Err(Error::Unimplemented("one input to several outputs".into()));
        }

        let mut work = pipe.clone();
        work.reset_decisions();
        finalize::drop_transparent_layers(&mut work);

        let ctx = RuleContext {
            caps: &self.caps,
            config: &self.config,
            session,
        };
        for layer in &mut work.layers {
            rules::resolve_layer(&ctx, &mut layer.filters)?;
        }
        for output in &mut work.outputs {
            rules::resolve_output(&ctx, &mut output.filters)?;
        }

        let mut input = aggregate::input_pipe_caps(&work)?;
        let selected = input
            .single
            .filter(|_| work.layers.len() == 1)
            .and_then(|index| work.layers.get(index))
            .map(|layer| &layer.filters);
        let output = aggregate::output_pipe_caps(&work, selected)?;

        if input.caps.bypass_vebox_features {
            if input.caps.isolated {
                return Err(Error::invalid("second field bypass with an isolated feature"));
            }
            let index = input
                .single
                .ok_or_else(|| Error::invalid("second field bypass without a selected layer"))?;
            aggregate::bypass_vebox_features(&mut work.layer_mut(index)?.filters, &mut input.caps);
        }

        let mut caps = aggregate::init_execute_caps(&input.caps, &output, work.layers.len())?;

        let layers = match input.single {
            _ if caps.composite => finalize::select_layers(&work, &self.caps.rules.fc)?,
            Some(index) => vec![index],
            None if work.layers.is_empty() => Vec::new(),
            None => return Err(Error::invalid("several layers selected outside composition")),
        };
        if caps.composite {
            finalize::unify_sampler(&mut work, &layers);
        }

        let (mut sfc_blocked, mut vebox_blocked) = (false, false);
        for &index in &layers {
            let (sfc, vebox) = aggregate::blocked_engines(&work.layer(index)?.filters);
            sfc_blocked |= sfc;
            vebox_blocked |= vebox;
        }
        aggregate::apply_blocked_engines(&mut caps, sfc_blocked, vebox_blocked);

        assign::assign(&mut work, &layers, &mut caps)?;
        debug!(
            "Plan: {} on layers {:?} [{}] -> {}",
            caps.engine_set(),
            layers,
            caps.flags().join(" "),
            work.describe()
        );
        Ok(Plan {
            caps,
            layers,
            pipe: work,
        })
    }

    /// Resolve and consume one pass of `pipe`
    pub fn resolve_pass(&self, pipe: &mut Pipe, session: &mut SessionContext) -> Result<Submission> {
        let Plan {
            mut caps,
            layers,
            pipe: mut work,
        } = self.build_execute_caps(pipe, session)?;

        let mut executed = Pipe::new();
        handler::move_features(&self.caps, &caps, &mut work, &mut executed, &layers)?;
        finalize::add_filters_based_on_caps(&mut caps, &mut executed)?;
        let intermediate = finalize::setup_resources(&mut caps, &mut work, &mut executed, &layers)?;

        if executed.feature_count() == 0 && !caps.last_submission {
            return Err(Error::invalid(format!(
                "no feature could be executed for [{}]",
                pipe.describe()
            )));
        }

        for feature in executed.layers.iter().flat_map(|l| l.filters.iter()) {
            if let Some(hdr) = feature.hdr() {
                session.commit_hdr(hdr);
            }
        }
        if caps.last_submission {
            session.end_frame();
        }

        let submission = Submission {
            engines: caps.engine_set(),
            caps,
            linked_layers: executed.layers.iter().map(|l| l.linked_index).collect(),
            executed,
            intermediate,
        };
        debug!(
            "Submission {}: [{}]",
            submission.engines,
            submission.executed.describe()
        );
        *pipe = work;
        Ok(submission)
    }

    /// Resolve passes until nothing is left of `pipe`
    pub fn resolve_pipe(&self, mut pipe: Pipe, session: &mut SessionContext) -> Result<Vec<Submission>> {
        let mut submissions = Vec::new();
        while !pipe.is_drained() {
            if submissions.len() >= self.config.max_passes {
                return Err(Error::CapacityExceeded(format!(
                    "frame still has [{}] after {} passes",
                    pipe.describe(),
                    submissions.len()
                )));
            }
            let submission = self.resolve_pass(&mut pipe, session)?;
            let last = submission.is_last();
            submissions.push(submission);
            if last {
                break;
            }
        }
        Ok(submissions)
    }

    /// Resolve every pass of one frame
    pub fn resolve_frame(&self, request: &Request, session: &mut SessionContext) -> Result<Vec<Submission>> {
        let pipe = Pipe::from_request(request)?;
        let submissions = self.resolve_pipe(pipe, session)?;
        info!(
            "Frame resolved in {} pass(es): {}",
            submissions.len(),
            submissions
                .iter()
                .map(|s| s.engines.name())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(submissions)
    }
}
