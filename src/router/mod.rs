//! The routing function: a pure, total function from a completed Task plus
//! the routing worker's own identity to the next queue name.
//!
//! Ported from `original_source/apps/AppRunner.py::route_target`, reordered
//! to match `spec.md` §4.3's stated rule order (scheduler-originated hop,
//! then transform-specific edges, then by worker type, then default).

/// The type classification of a Worker, used by routing rule 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppType {
    System,
    Analysis,
    Metadata,
    Tokens,
}

/// `route_target(task, router_app_name, router_app_type) -> queue_name`.
///
/// `task_app_name` is the app named on the task being routed (i.e. the
/// worker that just ran or that the scheduler wants to run next);
/// `router_app_name`/`router_app_type` identify the AppRunner doing the
/// routing (the worker that just produced this task, or the scheduler
/// itself). Returns `""` for a terminal/drop target.
pub fn route_target(task_app_name: &str, router_app_name: &str, router_app_type: AppType) -> &'static str {
    // Rule 1: scheduler -> worker hop.
    if router_app_name == "tasks" {
        return leak_app_name(task_app_name);
    }

    // Rule 2: transform-specific edges.
    if router_app_name == "file_mover" && task_app_name == "inventory" {
        return "tasks";
    }
    if router_app_name == "file_mover" {
        return "tasks";
    }
    if router_app_name == "inventory" && task_app_name == "inventory" {
        return "app_data";
    }
    if router_app_name == "app_data" && matches!(task_app_name, "inventory" | "librosa") {
        return "file_mover";
    }
    if router_app_name == "app_data" {
        return "";
    }

    // Rule 3: by worker type.
    if matches!(router_app_type, AppType::Analysis | AppType::Metadata | AppType::Tokens) {
        return "app_data";
    }

    // Rule 4: default.
    ""
}

/// Rule 1 returns the task's own `app_name` as the target queue. Since the
/// set of worker names is small and fixed, we intern the common ones as
/// `'static` rather than allocate; anything else falls back to a leaked
/// (but bounded, config-time-only) string. In practice the scheduler only
/// ever calls this with one of the configured worker names.
fn leak_app_name(name: &str) -> &'static str {
    match name {
        "inventory" => "inventory",
        "librosa" => "librosa",
        "path_parser" => "path_parser",
        "discogs" => "discogs",
        "lastfm" => "lastfm",
        "rutracker_scraper" => "rutracker_scraper",
        "file_mover" => "file_mover",
        "app_data" => "app_data",
        "catalog_intake" => "catalog_intake",
        _ => Box::leak(name.to_string().into_boxed_str()),
    }
}
