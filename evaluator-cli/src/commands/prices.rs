// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `evaluator prices` command - List the configured price table.

use evaluator_core::ConfigLoader;

pub async fn execute(config_path: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::load_file(config_path)?;

    if config.pricing.is_empty() {
        println!("No prices defined in configuration.");
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                   INSTANCE PRICING                   ║");
    println!("╠═══════════════════╦══════════════════╦═══════════════╣");
    println!("║ Instance Type     ║ USD / hour       ║ Benchmarked   ║");
    println!("╠═══════════════════╬══════════════════╬═══════════════╣");

    for (instance_type, rate) in config.pricing.iter() {
        let selected = config.benchmark.instance_types.contains(instance_type);
        println!(
            "║ {:<17} ║ {:<16} ║ {:<13} ║",
            instance_type.as_str(),
            format!("{:.4}", rate),
            if selected { "yes" } else { "" }
        );
    }

    println!("╚═══════════════════╩══════════════════╩═══════════════╝");
    println!();
    println!("Total: {} instance type(s)", config.pricing.len());

    for instance_type in config.unpriced_instance_types() {
        println!("Warning: {} is benchmarked but has no price", instance_type);
    }

    Ok(())
}
