use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::constraint::{resolve, ConstraintSet};
use crate::error::Result;
use crate::layout::{
    assemble, diff, instance_id, next_message_id, ComponentPropertiesEntry,
    ComponentPropertiesMessage, CreateMessage, Diff, GroupResult, MessageLayout, CREATE_LEAD_NS,
};
use crate::logging::{LogEvent, Logger};
use crate::metrics::{EngineMetrics, MetricSnapshot};
use crate::model::{
    ComponentId, ComponentSet, ComponentState, Context, DeviceId, Layout, PlacementStatus,
};
use crate::packer::{
    pack, pack_simulation, Candidate, CandidateScope, PackSettings,
};
use crate::region::Workspace;

/// Engine-level knobs; per-context knobs live on the context itself.
#[derive(Default)]
pub struct EngineConfig {
    pub logger: Option<Logger>,
}

/// The layout engine. One evaluation at a time per context; the caller
/// serialises calls for the same context. The engine itself performs no I/O
/// and holds no mutable state across calls beyond its metrics counters.
pub struct Engine {
    config: EngineConfig,
    metrics: Mutex<EngineMetrics>,
    started_at: Instant,
}

/// Input snapshot for one evaluation. The caller supplies the clock so the
/// evaluation stays a pure function of its arguments.
pub struct EvaluationInput<'a> {
    pub context: &'a Context,
    pub constraints: &'a ConstraintSet,
    pub components: &'a ComponentSet,
    pub previous: Option<&'a Layout>,
    /// Server time, nanoseconds since the Unix epoch.
    pub now_ns: u64,
}

pub struct Evaluation {
    pub layout: Layout,
    pub diff: Diff,
}

/// Dry-run result: which devices would host which components.
#[derive(Debug)]
pub struct Simulation {
    pub devices: BTreeMap<DeviceId, Vec<ComponentId>>,
    pub create: Vec<CreateMessage>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            metrics: Mutex::new(EngineMetrics::new()),
            started_at: Instant::now(),
        }
    }

    pub fn with_default() -> Self {
        Self::new(EngineConfig::default())
    }

    fn logger(&self) -> Option<&Logger> {
        self.config.logger.as_ref()
    }

    pub fn metrics_snapshot(&self) -> MetricSnapshot {
        self.metrics
            .lock()
            .expect("metrics mutex poisoned")
            .snapshot(self.started_at.elapsed())
    }

    /// Evaluate the layout for one context snapshot.
    pub fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Evaluation> {
        let context = input.context;
        let settings = PackSettings::from_config(&context.config);

        let mut results = Vec::new();
        let mut reduction_rounds = 0;
        let mut beautify_accepted = 0;
        for group in context.groups() {
            let mut workspace = Workspace::build(context, &group);
            let mut candidates = build_candidates(
                context,
                &workspace,
                input.constraints,
                input.components,
                self.logger(),
                None,
            );
            let report = pack(
                &mut workspace,
                &mut candidates,
                context,
                &settings,
                self.logger(),
            );
            reduction_rounds += report.reduction_rounds;
            beautify_accepted += report.beautify_accepted;
            results.push(GroupResult {
                group: group.id.clone(),
                device_ids: workspace
                    .device_indices
                    .iter()
                    .map(|&index| context.devices[index].id.clone())
                    .collect(),
                candidates,
            });
        }

        let mut layout = assemble(
            context,
            input.constraints.dmapp(),
            &results,
            |id| input.components.get(id).ok().cloned(),
            input.now_ns,
        );
        let diff = diff(input.previous, &mut layout, context, |id| {
            input.components.get(id).ok().cloned()
        });

        let placed = layout.placed_count();
        let rejected: usize = layout.not_placed.iter().map(|r| r.components.len()).sum();
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_evaluation(placed, rejected);
            metrics.record_reduction_rounds(reduction_rounds);
            metrics.record_beautify_accepted(beautify_accepted);
        }

        if let Some(logger) = self.logger() {
            logger.emit(
                LogEvent::debug("mosaic::engine", "evaluated")
                    .with("context", layout.context_id.as_str())
                    .with("placed", placed as u64)
                    .with("rejected", rejected as u64)
                    .with("create", diff.create.len() as u64)
                    .with("update", diff.update.len() as u64)
                    .with("destroy", diff.destroy.len() as u64),
            );
        }

        Ok(Evaluation { layout, diff })
    }

    /// Pre-placement dry run: pass 1 only, the components under test forced
    /// visible, nothing persisted. Returns the viable device mapping plus
    /// `create` messages with null lifecycle marks so candidate devices can
    /// pre-load.
    pub fn simulate(
        &self,
        input: &EvaluationInput<'_>,
        under_test: &[ComponentId],
    ) -> Result<Simulation> {
        for id in under_test {
            input.components.get(id)?;
        }

        let context = input.context;
        let mut devices: BTreeMap<DeviceId, Vec<ComponentId>> = BTreeMap::new();
        let mut create = Vec::new();

        for group in context.groups() {
            let mut workspace = Workspace::build(context, &group);
            let mut candidates = build_candidates(
                context,
                &workspace,
                input.constraints,
                input.components,
                self.logger(),
                Some(under_test),
            );
            pack_simulation(&mut workspace, &mut candidates, context);

            for candidate in &candidates {
                let Some(placement) = &candidate.placement else {
                    continue;
                };
                if !under_test.contains(&candidate.component_id) {
                    continue;
                }
                let device_id =
                    context.devices[workspace.device_indices[placement.device]].id.clone();
                devices
                    .entry(device_id.clone())
                    .or_default()
                    .push(candidate.component_id.clone());
                let component = input.components.get(&candidate.component_id)?;
                create.push(CreateMessage {
                    message_id: next_message_id(),
                    timestamp: input.now_ns.saturating_sub(CREATE_LEAD_NS),
                    component_id: candidate.component_id.clone(),
                    context_id: context.id.clone(),
                    dmapp_id: input.constraints.dmapp().to_string(),
                    device_id: device_id.clone(),
                    config: component.config.clone(),
                    start_time: None,
                    stop_time: None,
                    layout: MessageLayout::instance_only(instance_id(
                        &context.id,
                        input.constraints.dmapp(),
                        &device_id,
                        &candidate.component_id,
                    )),
                    parameters: component.parameters.clone(),
                    priorities: component.priorities.clone(),
                });
            }
        }

        Ok(Simulation { devices, create })
    }

    /// Priority-override announcement for the components of a layout, used
    /// by callers reacting to override transactions.
    pub fn component_properties(
        &self,
        layout: &Layout,
        components: &ComponentSet,
        now_ns: u64,
    ) -> ComponentPropertiesMessage {
        let entries = layout
            .devices
            .iter()
            .flat_map(|device| {
                device.components.iter().filter_map(|placed| {
                    let component = components.get(&placed.component_id).ok()?;
                    Some(ComponentPropertiesEntry {
                        component_id: placed.component_id.clone(),
                        dmapp_id: layout.dmapp_id.clone(),
                        context_id: layout.context_id.clone(),
                        device_id: device.device_id.clone(),
                        priorities: component.priorities.clone(),
                    })
                })
            })
            .collect();
        ComponentPropertiesMessage {
            message_id: next_message_id(),
            timestamp: now_ns,
            components: entries,
        }
    }
}

/// Whether the component takes part in packing at all. Destroyed and
/// stopped components are out; they surface through the differ instead.
fn eligible(component: &crate::model::Component) -> bool {
    component.is_active()
        && component.state != ComponentState::Stopped
        && component.stop_time.is_none()
}

/// Materialise the candidate list for one group.
///
/// A communal-side constraint yields one candidate over the group's
/// communal devices; a personal-side constraint yields one candidate per
/// personal device, pinned there. Hidden components and resolver failures
/// still produce candidates so every active component is accounted for.
fn build_candidates(
    context: &Context,
    workspace: &Workspace,
    constraints: &ConstraintSet,
    components: &ComponentSet,
    logger: Option<&Logger>,
    force_visible: Option<&[ComponentId]>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut order = 0;

    for (component_index, component) in components.iter().enumerate() {
        if !eligible(component) {
            continue;
        }
        let visible = component.visible
            || force_visible.is_some_and(|set| set.contains(&component.id));
        let record = constraints.lookup(component.constraint_id.as_deref());

        let mut emitted = 0;
        let mut invalid = false;

        if let Some(config) = &record.communal {
            let communal_devices: Vec<usize> = (0..workspace.device_indices.len())
                .filter(|&local| workspace.communal[local])
                .collect();
            if !communal_devices.is_empty() {
                let mut constraint_slots = vec![None; workspace.device_indices.len()];
                let mut failed = None;
                for &local in &communal_devices {
                    let device = workspace.device(context, local);
                    match resolve(component, config, device) {
                        Ok(effective) => constraint_slots[local] = Some(effective),
                        Err(err) => {
                            failed = Some(err);
                            break;
                        }
                    }
                }
                if let Some(err) = failed {
                    warn_invalid(logger, &component.id, &err);
                    invalid = true;
                    constraint_slots = vec![None; workspace.device_indices.len()];
                }
                candidates.push(Candidate {
                    component_index,
                    component_id: component.id.clone(),
                    scope: CandidateScope::Communal,
                    constraints: constraint_slots,
                    scale: 1.0,
                    order,
                    placement: None,
                    failure: initial_failure(visible, invalid),
                });
                order += 1;
                emitted += 1;
            }
        }

        if let Some(config) = &record.personal {
            for local in 0..workspace.device_indices.len() {
                if workspace.communal[local] {
                    continue;
                }
                let device = workspace.device(context, local);
                let mut constraint_slots = vec![None; workspace.device_indices.len()];
                let mut this_invalid = false;
                match resolve(component, config, device) {
                    Ok(effective) => constraint_slots[local] = Some(effective),
                    Err(err) => {
                        warn_invalid(logger, &component.id, &err);
                        this_invalid = true;
                    }
                }
                candidates.push(Candidate {
                    component_index,
                    component_id: component.id.clone(),
                    scope: CandidateScope::Personal(local),
                    constraints: constraint_slots,
                    scale: 1.0,
                    order,
                    placement: None,
                    failure: initial_failure(visible, this_invalid),
                });
                order += 1;
                emitted += 1;
            }
        }

        if emitted == 0 {
            // No applicable constraint side for this group; keep the
            // component accounted for.
            candidates.push(Candidate {
                component_index,
                component_id: component.id.clone(),
                scope: CandidateScope::Communal,
                constraints: vec![None; workspace.device_indices.len()],
                scale: 1.0,
                order,
                placement: None,
                failure: Some(if visible {
                    PlacementStatus::NoDevice
                } else {
                    PlacementStatus::Skipped
                }),
            });
            order += 1;
        }
    }

    candidates
}

fn initial_failure(visible: bool, invalid: bool) -> Option<PlacementStatus> {
    if invalid {
        Some(PlacementStatus::Incompatible)
    } else if !visible {
        Some(PlacementStatus::Skipped)
    } else {
        None
    }
}

fn warn_invalid(logger: Option<&Logger>, component: &str, err: &crate::error::EngineError) {
    if let Some(logger) = logger {
        logger.emit(
            LogEvent::warn("mosaic::constraint", "invalid_constraint")
                .with("component", component)
                .with("reason", err.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintDocument;
    use crate::logging::MemorySink;
    use crate::model::{
        Component, ContextConfig, CoordValue, Device, DeviceCapabilities, PriorityOverrides,
        RegionDef, SizeValue,
    };
    use serde_json::json;

    fn tv() -> Device {
        Device {
            id: "tv".to_string(),
            capabilities: DeviceCapabilities {
                display_width: 1920.0,
                display_height: 1080.0,
                dpi: 96.0,
                concurrent_audio: 1,
                concurrent_video: 1,
                touch_interaction: false,
                communal: true,
                orientations: vec![],
            },
            regions: vec![],
            group: "main".to_string(),
            orientation: None,
        }
    }

    fn tablet() -> Device {
        Device {
            id: "tablet".to_string(),
            capabilities: DeviceCapabilities {
                display_width: 1024.0,
                display_height: 768.0,
                dpi: 132.0,
                concurrent_audio: 1,
                concurrent_video: 1,
                touch_interaction: true,
                communal: false,
                orientations: vec![],
            },
            regions: vec![],
            group: "main".to_string(),
            orientation: None,
        }
    }

    fn context(devices: Vec<Device>) -> Context {
        Context {
            id: "ctx".to_string(),
            dmapp: "app".to_string(),
            devices,
            config: ContextConfig::default(),
        }
    }

    fn constraints(raw: &str) -> ConstraintSet {
        ConstraintSet::from_document(ConstraintDocument::from_json(raw).unwrap()).unwrap()
    }

    fn started(id: &str, constraint: &str) -> Component {
        Component {
            id: id.to_string(),
            constraint_id: Some(constraint.to_string()),
            state: ComponentState::Started,
            visible: true,
            start_time: Some(1.0),
            stop_time: None,
            priorities: PriorityOverrides::default(),
            pref_size: None,
            config: json!({}),
            parameters: json!({}),
        }
    }

    const NOW: u64 = 1_700_000_000_000_000_000;

    fn scenario_one_doc() -> ConstraintSet {
        constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "a",
                      "communal": {
                        "aspect": "16:9",
                        "minSize": { "width": 800, "height": 450 },
                        "prefSize": { "width": 1920, "height": 1080 },
                        "priority": 300 } },
                    { "constraintId": "b",
                      "communal": {
                        "minSize": { "width": 300, "height": 300 },
                        "prefSize": { "width": 500, "height": 600 },
                        "priority": 5 } }
                ]
            }"#,
        )
    }

    #[test]
    fn scenario_full_screen_video_squeezes_chat_out() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let components =
            ComponentSet::new(vec![started("video", "a"), started("chat", "b")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        let layout = &evaluation.layout;
        let video = layout.component_on_device("tv", "video").unwrap();
        assert_eq!(
            video.position,
            Some(crate::model::PositionValue {
                x: CoordValue::Px(0),
                y: CoordValue::Px(0),
            })
        );
        assert_eq!(
            video.size,
            Some(SizeValue {
                width: CoordValue::Px(1920),
                height: CoordValue::Px(1080),
            })
        );
        assert_eq!(
            layout.not_placed_status("chat"),
            Some(PlacementStatus::Skipped)
        );
        // Every active component is accounted for exactly once.
        assert_eq!(layout.placed_count(), 1);
        assert_eq!(evaluation.diff.create.len(), 1);
        assert_eq!(evaluation.diff.create[0].component_id, "video");
    }

    #[test]
    fn scenario_chat_alone_takes_preferred_size() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let components = ComponentSet::new(vec![started("chat", "b")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        let chat = evaluation.layout.component_on_device("tv", "chat").unwrap();
        assert_eq!(
            chat.size,
            Some(SizeValue {
                width: CoordValue::Px(500),
                height: CoordValue::Px(600),
            })
        );
        assert!(evaluation.layout.not_placed.is_empty());
    }

    #[test]
    fn scenario_mixed_group_routes_by_constraint_side() {
        let mut tv = tv();
        tv.regions = vec![RegionDef {
            id: "screen".to_string(),
            width: 1920.0,
            height: 1080.0,
            resizable: false,
        }];
        let ctx = context(vec![tv, tablet()]);
        let set = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "video",
                      "communal": {
                        "aspect": "16:9",
                        "minSize": { "width": 800, "height": 450 },
                        "prefSize": { "width": 1920, "height": 810 },
                        "priority": 300,
                        "audio": true },
                      "personal": {
                        "prefSize": { "width": 1920, "height": 1080 },
                        "targetRegions": ["tab1", "tab2"],
                        "priority": 300 } },
                    { "constraintId": "chat",
                      "personal": {
                        "minSize": { "width": 50, "height": 50 },
                        "priority": 2 } }
                ]
            }"#,
        );
        let components =
            ComponentSet::new(vec![started("video", "video"), started("chat", "chat")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        let layout = &evaluation.layout;
        assert!(layout.component_on_device("tv", "video").is_some());
        assert!(layout.component_on_device("tablet", "chat").is_some());
        assert!(layout.component_on_device("tablet", "video").is_none());
        assert!(layout.component_on_device("tv", "chat").is_none());
    }

    #[test]
    fn scenario_dependency_failure_is_no_dependent() {
        let mut small = tv();
        small.capabilities.display_width = 1000.0;
        small.capabilities.display_height = 1000.0;
        let ctx = context(vec![small]);
        let set = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "x",
                      "communal": {
                        "minSize": { "width": 1000, "height": 1000 },
                        "prefSize": { "width": 1000, "height": 1000 },
                        "priority": 10 } },
                    { "constraintId": "y",
                      "communal": {
                        "minSize": { "width": 500, "height": 500 },
                        "priority": 5,
                        "componentDependency": ["x"] } }
                ]
            }"#,
        );
        let components = ComponentSet::new(vec![started("x", "x"), started("y", "y")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        assert!(evaluation.layout.component_on_device("tv", "x").is_some());
        assert_eq!(
            evaluation.layout.not_placed_status("y"),
            Some(PlacementStatus::NoDependent)
        );
    }

    #[test]
    fn scenario_start_then_stop_lifecycle() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let engine = Engine::with_default();

        let running = ComponentSet::new(vec![started("c", "b")]);
        let first = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &running,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();
        assert_eq!(first.diff.create.len(), 1);
        assert_eq!(first.diff.create[0].component_id, "c");

        let mut stopped = started("c", "b");
        stopped.state = ComponentState::Stopped;
        stopped.stop_time = Some(42.0);
        let stopped_set = ComponentSet::new(vec![stopped]);
        let second = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &stopped_set,
                previous: Some(&first.layout),
                now_ns: NOW + 1,
            })
            .unwrap();
        assert!(second.diff.create.is_empty());
        assert!(second.diff.update.is_empty());
        assert_eq!(second.diff.destroy.len(), 1);
        assert_eq!(second.diff.destroy[0].component_id, "c");
        assert_eq!(second.diff.destroy[0].stop_time, Some(42.0));
    }

    #[test]
    fn scenario_hidden_but_running_carry_over() {
        let ctx = context(vec![tv()]);
        let engine = Engine::with_default();
        let fits = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "d",
                      "communal": {
                        "minSize": { "width": 500, "height": 500 },
                        "prefSize": { "width": 500, "height": 500 },
                        "priority": 10 } }
                ]
            }"#,
        );
        let grown = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "d",
                      "communal": {
                        "minSize": { "width": 4000, "height": 4000 },
                        "prefSize": { "width": 4000, "height": 4000 },
                        "priority": 10 } }
                ]
            }"#,
        );
        let components = ComponentSet::new(vec![started("d", "d")]);

        let first = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &fits,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();
        assert!(first.layout.component_on_device("tv", "d").is_some());

        let second = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &grown,
                components: &components,
                previous: Some(&first.layout),
                now_ns: NOW + 1,
            })
            .unwrap();
        assert!(second.diff.destroy.is_empty());
        assert_eq!(second.diff.update.len(), 1);
        let update = &second.diff.update[0];
        assert_eq!(update.component_id, "d");
        assert_eq!(
            update.layout.size,
            Some(SizeValue {
                width: CoordValue::Px(-1),
                height: CoordValue::Px(-1),
            })
        );
    }

    #[test]
    fn oversized_min_yields_incompatible_and_empty_devices() {
        let ctx = context(vec![tv()]);
        let set = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "huge",
                      "communal": {
                        "minSize": { "width": 4000, "height": 4000 },
                        "priority": 10 } }
                ]
            }"#,
        );
        let components = ComponentSet::new(vec![started("huge", "huge")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        assert_eq!(evaluation.layout.placed_count(), 0);
        assert_eq!(
            evaluation.layout.not_placed_status("huge"),
            Some(PlacementStatus::Incompatible)
        );
    }

    #[test]
    fn priority_zero_is_skipped_not_placed() {
        let ctx = context(vec![tv()]);
        let set = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "muted",
                      "communal": { "priority": 0 } }
                ]
            }"#,
        );
        let components = ComponentSet::new(vec![started("muted", "muted")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        assert_eq!(evaluation.layout.placed_count(), 0);
        assert_eq!(
            evaluation.layout.not_placed_status("muted"),
            Some(PlacementStatus::Skipped)
        );
    }

    #[test]
    fn reevaluation_with_unchanged_inputs_is_idempotent() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let components =
            ComponentSet::new(vec![started("video", "a"), started("chat", "b")]);
        let engine = Engine::with_default();
        let input = EvaluationInput {
            context: &ctx,
            constraints: &set,
            components: &components,
            previous: None,
            now_ns: NOW,
        };
        let first = engine.evaluate(&input).unwrap();
        let second = engine
            .evaluate(&EvaluationInput {
                previous: Some(&first.layout),
                ..input
            })
            .unwrap();

        assert_eq!(first.layout, second.layout);
        assert!(second.diff.is_empty());
    }

    #[test]
    fn percent_coords_render_percent_strings() {
        let mut ctx = context(vec![tv()]);
        ctx.config.percent_coords = true;
        let set = scenario_one_doc();
        let components = ComponentSet::new(vec![started("chat", "b")]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        let chat = evaluation.layout.component_on_device("tv", "chat").unwrap();
        match &chat.size {
            Some(SizeValue {
                width: CoordValue::Percent(w),
                height: CoordValue::Percent(h),
            }) => {
                let width = crate::layout::percent_to_px(w, 1920.0).unwrap();
                let height = crate::layout::percent_to_px(h, 1080.0).unwrap();
                assert!((width - 500.0).abs() < 1.0);
                assert!((height - 600.0).abs() < 1.0);
            }
            other => panic!("expected percent size, got {other:?}"),
        }
    }

    #[test]
    fn simulation_reports_viable_devices_without_persisting() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let mut hidden = started("video", "a");
        hidden.visible = false;
        hidden.start_time = None;
        let components = ComponentSet::new(vec![hidden]);
        let engine = Engine::with_default();
        let simulation = engine
            .simulate(
                &EvaluationInput {
                    context: &ctx,
                    constraints: &set,
                    components: &components,
                    previous: None,
                    now_ns: NOW,
                },
                &["video".to_string()],
            )
            .unwrap();

        assert_eq!(
            simulation.devices.get("tv"),
            Some(&vec!["video".to_string()])
        );
        assert_eq!(simulation.create.len(), 1);
        assert_eq!(simulation.create[0].start_time, None);
        assert_eq!(simulation.create[0].stop_time, None);
    }

    #[test]
    fn simulation_rejects_unknown_component() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let components = ComponentSet::new(vec![]);
        let engine = Engine::with_default();
        let err = engine
            .simulate(
                &EvaluationInput {
                    context: &ctx,
                    constraints: &set,
                    components: &components,
                    previous: None,
                    now_ns: NOW,
                },
                &["ghost".to_string()],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::UnknownComponent(_)
        ));
    }

    #[test]
    fn invalid_constraint_warns_and_demotes() {
        let ctx = context(vec![tv()]);
        let set = constraints(
            r#"{
                "version": 4,
                "dmapp": "app",
                "layoutModel": "dynamic",
                "constraints": [
                    { "constraintId": "default",
                      "communal": { "priority": 1 }, "personal": { "priority": 1 } },
                    { "constraintId": "broken",
                      "communal": { "aspect": "wide", "priority": 10 } }
                ]
            }"#,
        );
        let components = ComponentSet::new(vec![started("broken", "broken")]);
        let sink = MemorySink::new();
        let engine = Engine::new(EngineConfig {
            logger: Some(Logger::new(sink.clone())),
        });
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        assert_eq!(
            evaluation.layout.not_placed_status("broken"),
            Some(PlacementStatus::Incompatible)
        );
        assert!(sink
            .events()
            .iter()
            .any(|e| e.target == "mosaic::constraint" && e.message == "invalid_constraint"));
    }

    #[test]
    fn component_properties_announcement() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let mut chat = started("chat", "b");
        chat.priorities.context = Some(7);
        let components = ComponentSet::new(vec![chat]);
        let engine = Engine::with_default();
        let evaluation = engine
            .evaluate(&EvaluationInput {
                context: &ctx,
                constraints: &set,
                components: &components,
                previous: None,
                now_ns: NOW,
            })
            .unwrap();

        let message = engine.component_properties(&evaluation.layout, &components, NOW);
        assert_eq!(message.components.len(), 1);
        assert_eq!(message.components[0].component_id, "chat");
        assert_eq!(message.components[0].priorities.context, Some(7));
    }

    #[test]
    fn metrics_accumulate_across_evaluations() {
        let ctx = context(vec![tv()]);
        let set = scenario_one_doc();
        let components = ComponentSet::new(vec![started("chat", "b")]);
        let engine = Engine::with_default();
        for _ in 0..2 {
            engine
                .evaluate(&EvaluationInput {
                    context: &ctx,
                    constraints: &set,
                    components: &components,
                    previous: None,
                    now_ns: NOW,
                })
                .unwrap();
        }
        let snapshot = engine.metrics_snapshot();
        assert_eq!(snapshot.evaluations, 2);
        assert_eq!(snapshot.components_placed, 2);
    }
}
