//! Portable flow bundles: a zip with one `agents/{id}.json` per agent and a
//! `description.txt`. The flow name is the archive's file stem.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::FlowError;
use crate::models::{Agent, AgentFlow};

const AGENTS_DIR: &str = "agents/";
const DESCRIPTION: &str = "description.txt";

fn zip_error(path: &Path, e: impl std::fmt::Display) -> FlowError {
    FlowError::Data(format!("Flow archive {}: {}", path.display(), e))
}

pub fn save(flow: &AgentFlow, path: &Path) -> Result<(), FlowError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| zip_error(path, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| zip_error(path, e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut agents: Vec<&Agent> = flow.agents.iter().collect();
    agents.sort_by_key(|a| a.order);
    for agent in agents {
        let json = serde_json::to_vec_pretty(agent)
            .map_err(|e| FlowError::Internal(format!("Failed to serialize agent: {}", e)))?;
        zip.start_file(format!("{}{}.json", AGENTS_DIR, agent.id), options)
            .map_err(|e| zip_error(path, e))?;
        zip.write_all(&json).map_err(|e| zip_error(path, e))?;
    }

    zip.start_file(DESCRIPTION, options)
        .map_err(|e| zip_error(path, e))?;
    zip.write_all(flow.description.as_bytes())
        .map_err(|e| zip_error(path, e))?;
    zip.finish().map_err(|e| zip_error(path, e))?;

    tracing::info!(
        "[FlowArchive] Saved '{}' ({} agents) to {}",
        flow.name,
        flow.agents.len(),
        path.display()
    );
    Ok(())
}

pub fn load(path: &Path) -> Result<AgentFlow, FlowError> {
    let file = std::fs::File::open(path)
        .map_err(|e| FlowError::NotFound(format!("flow archive {}: {}", path.display(), e)))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut flow = AgentFlow::new(name, "");

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_error(path, e))?;
        let entry_name = entry.name().to_string();
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| zip_error(path, e))?;

        if entry_name == DESCRIPTION {
            flow.description = content;
        } else if entry_name.starts_with(AGENTS_DIR) && entry_name.ends_with(".json") {
            let agent: Agent = serde_json::from_str(&content)
                .map_err(|e| zip_error(path, format!("{}: {}", entry_name, e)))?;
            agent.parsed_steps()?;
            flow.agents.push(agent);
        } else {
            tracing::warn!("[FlowArchive] Ignoring unexpected entry {}", entry_name);
        }
    }

    flow.sort_agents();
    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentSource, ApiSource};
    use crate::steps::StepBuilder;

    fn flow() -> AgentFlow {
        let mut flow = AgentFlow::new("ignored", "Answers billing questions");
        let billing = Agent::builder()
            .with_id("billing")
            .with_name("Billing")
            .with_model("m")
            .with_order(1)
            .with_steps(StepBuilder::new().fetch_data().answer().build())
            .with_source(AgentSource::Api(ApiSource::get("https://x/@filter@")))
            .build()
            .unwrap();
        let triage = Agent::builder()
            .with_id("triage")
            .with_name("Triage")
            .with_model("m")
            .with_order(0)
            .with_steps(
                StepBuilder::new()
                    .start()
                    .answer()
                    .redirect("billing", "AS_Output", "REPLACE")
                    .build(),
            )
            .with_behaviour("Strict", "Only @filter@")
            .build()
            .unwrap();
        flow.agents = vec![billing, triage];
        flow
    }

    #[test]
    fn round_trip_restores_agents_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("support-desk.zip");
        let original = flow();
        save(&original, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.name, "support-desk");
        assert_eq!(loaded.description, "Answers billing questions");

        let mut expected = original.agents.clone();
        expected.sort_by_key(|a| a.order);
        assert_eq!(loaded.agents, expected);
        assert_eq!(loaded.agents[0].id, "triage");
    }

    #[test]
    fn missing_archive_is_not_found() {
        let err = load(Path::new("/no/such/flow.zip")).unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
    }

    #[test]
    fn garbage_archive_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.zip");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(load(&path).unwrap_err(), FlowError::Data(_)));
    }
}
