//! The pipeline orchestrator: normalize, plan, render panel by panel, assemble.

use crate::audience::{resolve, AudienceProfile};
use crate::cancel::CancellationToken;
use crate::comic::{ComicResult, PanelDescriptor, RenderedPanel};
use crate::config::{PipelineConfig, RenderFailurePolicy};
use crate::context::ContextWindow;
use crate::error::{ComicError, PipelineError};
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::render::{PanelRenderer, RetryPolicy};
use crate::request::GenerationRequest;
use crate::script::ScriptPlanner;
use crate::services::Services;
use crate::source::SourceNormalizer;

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Normalizing,
    Planning,
    Rendering { panel: usize },
    Assembling,
    Done,
    Aborted { reason: String },
}

impl PipelineState {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineState::Idle => Stage::Idle,
            PipelineState::Normalizing => Stage::Normalizing,
            PipelineState::Planning => Stage::Planning,
            PipelineState::Rendering { .. } => Stage::Rendering,
            PipelineState::Assembling => Stage::Assembling,
            PipelineState::Done => Stage::Done,
            PipelineState::Aborted { .. } => Stage::Aborted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted { .. })
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Normalizing) => true,
            (Normalizing, Planning) => true,
            (Planning, Rendering { panel: 0 }) => true,
            (Rendering { panel: current }, Rendering { panel: following }) => {
                *following == current + 1
            }
            (Rendering { .. }, Assembling) => true,
            (Assembling, Done) => true,
            (Idle, Aborted { .. }) => false,
            (current, Aborted { .. }) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// One run's state machine and its progress reporting.
struct Run<'a> {
    state: PipelineState,
    sink: &'a dyn ProgressSink,
}

impl<'a> Run<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            state: PipelineState::Idle,
            sink,
        }
    }

    /// Move to `next`. An illegal move leaves the state untouched and fails.
    fn advance(&mut self, next: PipelineState, message: impl Into<String>) -> Result<(), ComicError> {
        if !self.state.can_transition_to(&next) {
            tracing::error!(from = ?self.state, to = ?next, "illegal pipeline transition rejected");
            return Err(ComicError::IllegalTransition {
                from: format!("{:?}", self.state),
                to: format!("{next:?}"),
            });
        }

        let event = match next {
            PipelineState::Rendering { panel } => {
                ProgressEvent::for_panel(Stage::Rendering, panel, message)
            }
            ref state => ProgressEvent::new(state.stage(), message),
        };
        tracing::info!(stage = %event.stage, "{}", event.message);
        self.state = next;
        self.sink.emit(event);
        Ok(())
    }

    /// Move to `Aborted`, remembering the stage the failure happened in.
    fn abort(&mut self, error: ComicError) -> PipelineError {
        let error = PipelineError::new(self.state.stage(), error);
        let reason = error.reason();

        if error.is_cancelled() {
            tracing::warn!(stage = %error.stage, "run cancelled");
        } else {
            tracing::error!(stage = %error.stage, kind = error.error.kind_name(), "run failed: {}", error.error);
        }

        // Already logged if illegal; the original error is what the caller needs.
        let _ = self.advance(
            PipelineState::Aborted {
                reason: reason.clone(),
            },
            format!("aborted: {reason}"),
        );
        error
    }
}

/// Runs generation requests against a fixed set of collaborators.
///
/// A pipeline holds no per-run state; one instance can serve many requests,
/// each with its own context window.
pub struct Pipeline {
    normalizer: SourceNormalizer,
    planner: ScriptPlanner,
    renderer: PanelRenderer,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        let retry = RetryPolicy {
            max_retries: config.max_render_retries,
            base_delay: config.retry_base_delay,
        };
        Self {
            normalizer: SourceNormalizer::new(&services, config.call_timeout),
            planner: ScriptPlanner::new(services.text.clone(), config.call_timeout),
            renderer: PanelRenderer::new(services.images.clone(), retry, config.call_timeout),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one request to completion.
    ///
    /// Every terminal failure carries the stage it happened in. Cancellation
    /// is honored between stages and between panels.
    #[tracing::instrument(
        name = "comic_run",
        skip_all,
        fields(
            run_id = %request.id(),
            band = %request.audience_band(),
            pages = request.page_count(),
        )
    )]
    pub async fn run(
        &self,
        request: &GenerationRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ComicResult, PipelineError> {
        let mut run = Run::new(sink);
        match self.execute(&mut run, request, cancel).await {
            Ok(result) => Ok(result),
            Err(error) => Err(run.abort(error)),
        }
    }

    async fn execute(
        &self,
        run: &mut Run<'_>,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ComicResult, ComicError> {
        let profile = resolve(request.audience_band());

        run.advance(
            PipelineState::Normalizing,
            format!("normalizing {} source", request.source_kind()),
        )?;
        cancel.check()?;
        let material = self
            .normalizer
            .normalize(
                request.source_kind(),
                request.source_value(),
                request.audience_band(),
                run.sink,
                cancel,
            )
            .await?;
        cancel.check()?;

        let total = profile.panel_count(request.page_count());
        run.advance(
            PipelineState::Planning,
            format!("planning {total} panels over {} page(s)", request.page_count()),
        )?;
        let script = self
            .planner
            .plan(&material, &profile, request.page_count(), request.theme())
            .await?;

        let (panels, skipped_panels) = self.render_all(run, &script.panels, &profile, cancel).await?;

        cancel.check()?;
        run.advance(PipelineState::Assembling, "assembling comic")?;
        let result = ComicResult {
            title: script.title,
            panels,
            request: request.clone(),
            skipped_panels,
        };

        run.advance(
            PipelineState::Done,
            if result.is_partial() {
                format!(
                    "done: {} panels, {} skipped",
                    result.len(),
                    result.skipped_panels.len()
                )
            } else {
                format!("done: {} panels", result.len())
            },
        )?;
        Ok(result)
    }

    /// Render in index order, feeding each success into the context window.
    async fn render_all(
        &self,
        run: &mut Run<'_>,
        descriptors: &[PanelDescriptor],
        profile: &AudienceProfile,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RenderedPanel>, Vec<usize>), ComicError> {
        let total = descriptors.len();
        let mut window = ContextWindow::new(self.config.context_window);
        let mut panels = Vec::with_capacity(total);
        let mut skipped = Vec::new();
        let mut last_error = None;

        for descriptor in descriptors {
            cancel.check()?;
            run.advance(
                PipelineState::Rendering {
                    panel: descriptor.index,
                },
                format!("rendering panel {} of {}", descriptor.index + 1, total),
            )?;

            let context = window.context_for(descriptor);
            match self
                .renderer
                .render(descriptor, &context, profile, total, run.sink, cancel)
                .await
            {
                Ok(panel) => {
                    window.record(&panel);
                    panels.push(panel);
                }
                Err(error)
                    if self.config.render_failure_policy == RenderFailurePolicy::SkipPanel
                        && !matches!(error, ComicError::Cancelled) =>
                {
                    tracing::warn!(panel = descriptor.index, "skipping panel: {error}");
                    run.sink.emit(ProgressEvent::for_panel(
                        Stage::Rendering,
                        descriptor.index,
                        format!("skipping panel {} of {}", descriptor.index + 1, total),
                    ));
                    skipped.push(descriptor.index);
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        // Partial mode still needs something to show.
        if panels.is_empty() {
            if let Some(error) = last_error {
                return Err(error);
            }
        }

        Ok((panels, skipped))
    }
}
