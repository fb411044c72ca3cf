//! Goals command - lists the configured goals with their compiled rules.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::config::Config;
use crate::rules::RuleSet;

pub fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let rules = RuleSet::compile(&config.goals, &config.rules.mutexes, &config.rules.delays)?;

    println!("{}", "Election goals".bold().blue());
    for (i, course) in rules.goals().iter().enumerate() {
        println!("{} {}", format!("{:>2}.", i + 1).dimmed(), course);
        if let Some(threshold) = rules.delay(i) {
            println!("     delayed until remaining seats ≤ {threshold}");
        }
        let partners: Vec<String> = rules
            .partners(i)
            .map(|j| rules.goals()[j].to_string())
            .collect();
        if !partners.is_empty() {
            println!("     mutex with {}", partners.join(", "));
        }
    }
    Ok(())
}
