//! HTML templates, embedded at compile time

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

const TEMPLATES: [(&str, &str); 5] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("predictor.html", include_str!("../../templates/predictor.html")),
    ("results.html", include_str!("../../templates/results.html")),
    ("results_batch.html", include_str!("../../templates/results_batch.html")),
];

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("Failed to compile template {}", name))?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(context))
            .with_context(|| format!("Failed to render template {}", name))
    }
}
