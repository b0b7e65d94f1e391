use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Integration paths the Resolve scripting module expects to find in a child's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveEnv {
    pub script_api: PathBuf,
    pub script_lib: PathBuf,
}

impl ResolveEnv {
    pub fn new(script_api: impl Into<PathBuf>, script_lib: impl Into<PathBuf>) -> Self {
        ResolveEnv {
            script_api: script_api.into(),
            script_lib: script_lib.into(),
        }
    }

    /// `<api>/Modules/`, the directory holding DaVinciResolveScript.
    pub fn modules_dir(&self) -> String {
        format!("{}/Modules/", self.script_api.display())
    }

    /// Variables layered over the inherited environment of a script subprocess.
    pub fn script_vars(&self) -> HashMap<String, String> {
        let mut env_vars = HashMap::new();
        env_vars.insert(
            "RESOLVE_SCRIPT_API".to_string(),
            self.script_api.display().to_string(),
        );
        env_vars.insert(
            "RESOLVE_SCRIPT_LIB".to_string(),
            self.script_lib.display().to_string(),
        );
        env_vars.insert("PYTHONPATH".to_string(), self.modules_dir());
        env_vars
    }

    /// Variables for the child tool server; its own sources go on the module path too.
    pub fn tool_server_vars(&self, server_dir: &Path) -> HashMap<String, String> {
        let mut env_vars = self.script_vars();
        env_vars.insert(
            "PYTHONPATH".to_string(),
            format!(
                "{}:{}/src:{}",
                self.modules_dir(),
                server_dir.display(),
                server_dir.display()
            ),
        );
        env_vars
    }
}
