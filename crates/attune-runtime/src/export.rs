// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON export of a finished run.

use anyhow::Context;
use attune_control::PerformanceExport;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes `export` to `path` as pretty-printed JSON, replacing any existing file.
pub fn write_json(path: &Path, export: &PerformanceExport) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, export)
        .with_context(|| format!("failed to serialise export to {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write export file {}", path.display()))?;
    log::info!(
        "Export: Wrote {} samples to {}",
        export.performance_history.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attune_control::{ControlConfig, ControlContext, FrameLoop, SchedulerState};
    use attune_core::{ManualClock, MetricReport};
    use std::sync::Arc;

    #[test]
    fn test_export_document_layout() {
        let clock = Arc::new(ManualClock::new(50.0));
        let ctx = ControlContext::with_clock(ControlConfig::default(), clock).unwrap();
        let mut fl = FrameLoop::new(ctx);
        fl.controller()
            .context()
            .record_performance_metric("networking", MetricReport::throughput("packets", 45.0, 60.0), 0.5)
            .unwrap();
        fl.tick();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        write_json(&path, &fl.export(SchedulerState::Stopped)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        for key in [
            "settings",
            "engine_state",
            "stats",
            "frame_stats",
            "subsystems",
            "performance_history",
            "optimization_strategies",
            "baselines",
            "suggestions",
        ] {
            assert!(doc.get(key).is_some(), "missing `{key}`");
        }
        assert_eq!(doc["engine_state"], "stopped");
        assert_eq!(doc["settings"]["tick_rate"], 60);
        assert_eq!(doc["optimization_strategies"].as_array().unwrap().len(), 5);

        let history = doc["performance_history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["subsystem"], "networking");
        assert_eq!(history[0]["polarity"], "throughput");
        assert_eq!(history[0]["weight"], 0.5);
        assert_eq!(history[1]["subsystem"], "engine");
    }

    #[test]
    fn test_unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("run.json");
        let ctx = ControlContext::new(ControlConfig::default()).unwrap();
        let err = write_json(&path, &FrameLoop::new(ctx).export(SchedulerState::Stopped))
            .unwrap_err();
        assert!(err.to_string().contains("failed to create export file"));
    }
}
