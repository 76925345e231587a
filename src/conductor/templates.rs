//! Canonical templated answers for the categories that don't need an LLM
//! call at all (greeting, what-can-you-do, status query). An operator can
//! override any of these by dropping a same-named `.txt` file into
//! `templates-dir`; a missing file falls back to the built-in copy.

use std::path::PathBuf;

const GREETING_FALLBACK: &str = "Hello! Tell me what you'd like done and I'll get started.";
const CAPABILITIES_FALLBACK: &str = "I can answer direct questions, write and run code, and break larger \
goals into subtasks handled by a team of specialized experts. Ask me anything or describe a task.";
const STATUS_FALLBACK: &str = "Everything is running normally.";

pub struct Templates {
    dir: Option<PathBuf>,
}

impl Templates {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn greeting(&self) -> String {
        self.load("greeting.txt").unwrap_or_else(|| GREETING_FALLBACK.to_string())
    }

    pub fn capabilities(&self) -> String {
        self.load("capabilities.txt").unwrap_or_else(|| CAPABILITIES_FALLBACK.to_string())
    }

    pub fn status(&self) -> String {
        self.load("status.txt").unwrap_or_else(|| STATUS_FALLBACK.to_string())
    }

    fn load(&self, name: &str) -> Option<String> {
        let dir = self.dir.as_ref()?;
        std::fs::read_to_string(dir.join(name)).ok().map(|s| s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_when_no_dir_configured() {
        let templates = Templates::new(None);
        assert_eq!(templates.greeting(), GREETING_FALLBACK);
        assert_eq!(templates.capabilities(), CAPABILITIES_FALLBACK);
        assert_eq!(templates.status(), STATUS_FALLBACK);
    }

    #[test]
    fn loads_override_file_when_present() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("greeting.txt"), "Yo.\n").unwrap();
        let templates = Templates::new(Some(dir.path().to_path_buf()));
        assert_eq!(templates.greeting(), "Yo.");
        assert_eq!(templates.capabilities(), CAPABILITIES_FALLBACK);
    }
}
