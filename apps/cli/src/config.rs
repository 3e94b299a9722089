use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: String,
    pub program_id: String,
    pub signer_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8899/".into(),
            program_id: "GifPortal111111111111111111111111111111111".into(),
            signer_address: "DevWa11et1111111111111111111111111111111111".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("portal.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply(&mut settings, &file_cfg);
        }
    }

    if let Ok(v) = std::env::var("PORTAL_ENDPOINT") {
        settings.endpoint = v;
    }
    if let Ok(v) = std::env::var("PORTAL_PROGRAM_ID") {
        settings.program_id = v;
    }
    if let Ok(v) = std::env::var("PORTAL_SIGNER_ADDRESS") {
        settings.signer_address = v;
    }

    settings
}

fn apply(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("endpoint") {
        settings.endpoint = v.clone();
    }
    if let Some(v) = file_cfg.get("program_id") {
        settings.program_id = v.clone();
    }
    if let Some(v) = file_cfg.get("signer_address") {
        settings.signer_address = v.clone();
    }
}
