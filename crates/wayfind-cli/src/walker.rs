//! Headless first-person walk: moves the agent along the live path and feeds
//! each step through the tick loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use wayfind_runtime::NavigationLoop;
use wayfind_types::Vec3;

#[derive(Debug, Clone, Copy)]
pub struct WalkSettings {
    pub tick_hz: u32,
    pub speed_mps: f32,
    /// Sleep one tick period between steps.
    pub realtime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkSummary {
    pub ticks: u32,
    pub elapsed_s: f32,
    /// The route ended during the walk (arrival, or an unreachable target).
    pub route_ended: bool,
    pub interrupted: bool,
}

/// Point `step` metres along `path`, starting at its first waypoint.
///
/// Stops at the last waypoint; `None` for an empty path.
pub fn advance_along(path: &[Vec3], step: f32) -> Option<Vec3> {
    let (&first, rest) = path.split_first()?;
    let mut here = first;
    let mut left = step.max(0.0);
    for &next in rest {
        let segment = here.distance(next);
        if segment >= left {
            if segment <= f32::EPSILON {
                return Some(next);
            }
            return Some(here.add(next.sub(here).scale(left / segment)));
        }
        left -= segment;
        here = next;
    }
    Some(here)
}

/// Walk for at most `seconds`, or until the route ends or `shutdown` is set.
pub fn walk(
    nav: &mut NavigationLoop,
    seconds: f32,
    settings: WalkSettings,
    shutdown: &Arc<AtomicBool>,
) -> WalkSummary {
    let hz = settings.tick_hz.max(1);
    let dt = 1.0 / hz as f32;
    let max_ticks = (seconds.max(0.0) * hz as f32).ceil() as u32;
    let mut summary = WalkSummary {
        ticks: 0,
        elapsed_s: 0.0,
        route_ended: false,
        interrupted: false,
    };

    while summary.ticks < max_ticks {
        if shutdown.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }
        if !nav.route_active() {
            summary.route_ended = summary.ticks > 0;
            break;
        }
        let Some(current) = nav.agent_position() else {
            break;
        };
        let path = nav.view().path;
        let next = advance_along(&path, settings.speed_mps * dt)
            .map(|p| Vec3::new(p.x, current.y, p.z))
            .unwrap_or(current);

        nav.tick(next, dt);
        summary.ticks += 1;
        summary.elapsed_s += dt;

        if settings.realtime {
            std::thread::sleep(Duration::from_secs_f32(dt));
        }
    }
    if !summary.route_ended && !nav.route_active() {
        summary.route_ended = true;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfind_middleware::EventBus;
    use wayfind_middleware::dispatcher::dispatch_channel;
    use wayfind_runtime::NavigationConfig;
    use wayfind_session::SessionController;
    use wayfind_spatial::FloorPlan;
    use wayfind_types::Group;

    #[test]
    fn advance_along_follows_corners() {
        let path = [
            Vec3::zero(),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 4.0),
        ];
        assert_eq!(advance_along(&path, 1.5), Some(Vec3::new(1.5, 0.0, 0.0)));
        assert_eq!(advance_along(&path, 5.0), Some(Vec3::new(3.0, 0.0, 2.0)));
        assert_eq!(advance_along(&path, 50.0), Some(Vec3::new(3.0, 0.0, 4.0)));
        assert_eq!(advance_along(&[], 1.0), None);
    }

    #[test]
    fn walk_on_the_builtin_plan_reaches_the_destination() {
        let plan = FloorPlan::builtin();
        let (handle, _inbox) = dispatch_channel();
        let mut nav = NavigationLoop::new(
            NavigationConfig {
                destinations: plan.destinations(),
                ..NavigationConfig::default()
            },
            Box::new(plan.build_graph().unwrap()),
            SessionController::new(handle, "ADMIN2026"),
            EventBus::default(),
        );
        nav.login("ADMIN2026", Group::Control).unwrap();
        nav.place_agent(plan.spawn());
        nav.set_destination(Some("Oficinas")).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let settings = WalkSettings {
            tick_hz: 10,
            speed_mps: 5.0,
            realtime: false,
        };
        let summary = walk(&mut nav, 30.0, settings, &shutdown);
        assert!(summary.route_ended);
        assert!(!summary.interrupted);
        assert!(summary.ticks < 300);
        let at = nav.agent_position().unwrap();
        assert!(at.planar_distance(Vec3::new(0.0, 0.0, 10.0)) < 1.5);
    }

    #[test]
    fn shutdown_flag_interrupts_the_walk() {
        let plan = FloorPlan::builtin();
        let (handle, _inbox) = dispatch_channel();
        let mut nav = NavigationLoop::new(
            NavigationConfig {
                destinations: plan.destinations(),
                ..NavigationConfig::default()
            },
            Box::new(plan.build_graph().unwrap()),
            SessionController::new(handle, "ADMIN2026"),
            EventBus::default(),
        );
        nav.place_agent(plan.spawn());
        nav.set_destination(Some("Recepcion")).unwrap();

        let shutdown = Arc::new(AtomicBool::new(true));
        let settings = WalkSettings {
            tick_hz: 10,
            speed_mps: 5.0,
            realtime: false,
        };
        let summary = walk(&mut nav, 10.0, settings, &shutdown);
        assert!(summary.interrupted);
        assert_eq!(summary.ticks, 0);
        assert!(nav.route_active());
    }
}
