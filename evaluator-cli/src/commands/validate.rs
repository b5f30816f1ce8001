// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `evaluator validate` command - Validate configuration file.

use evaluator_core::ConfigLoader;

pub async fn execute(file: &str) -> anyhow::Result<()> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Provider:");
            println!("  Region:             {}", config.provider.region);
            println!("  Image:              {}", config.provider.launch.image_id);
            println!(
                "  User Data:          {} bytes",
                config.provider.launch.user_data.len()
            );
            println!(
                "  Status Checks:      {}",
                if config.provider.require_status_checks {
                    "required"
                } else {
                    "not required"
                }
            );
            println!();
            println!("Service:");
            println!("  Health URL:         {}", config.health_check().url("<host>"));
            println!("  Inference URL:      {}", config.inference().url("<host>"));
            println!("  Payload:            {}", config.service.payload_path.display());
            println!();
            println!("Timeouts:");
            println!(
                "  Instance Ready:     {}s (poll every {}s)",
                config.timeouts.instance_ready.as_secs(),
                config.timeouts.instance_poll_interval.as_secs()
            );
            println!(
                "  Service Health:     {}s (poll every {}s)",
                config.timeouts.health_deadline.as_secs(),
                config.timeouts.health_poll_interval.as_secs()
            );
            println!(
                "  Request:            {}s",
                config.timeouts.request_timeout.as_secs()
            );
            println!();
            println!(
                "Benchmark ({} run(s), {} warm-up, {:?} on failure):",
                config.benchmark.runs, config.benchmark.warmup_runs, config.benchmark.failure_policy
            );
            for instance_type in &config.benchmark.instance_types {
                match config.pricing.hourly_rate(instance_type) {
                    Some(rate) => println!("  - {} (${}/hr)", instance_type, rate),
                    None => println!("  - {} (no price: will fail)", instance_type),
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
