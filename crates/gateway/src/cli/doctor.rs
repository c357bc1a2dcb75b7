use ringdown_domain::config::{Config, ConfigSeverity};
use ringdown_providers::registry::ProviderRegistry;

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("ringdown doctor");
    println!("===============\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_llm_provider(config, &mut all_passed);
    check_agent_profiles(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_llm_provider(config: &Config, all_passed: &mut bool) {
    match ProviderRegistry::from_config(&config.llm) {
        Ok(registry) if registry.is_ready() => {
            print_check("LLM provider ready", true, config.llm.provider.base_url.clone());
        }
        Ok(registry) => {
            print_check(
                "LLM provider ready",
                false,
                registry.init_error().unwrap_or("unknown error").to_string(),
            );
            *all_passed = false;
        }
        Err(e) => {
            print_check("LLM provider ready", false, e.to_string());
            *all_passed = false;
        }
    }
}

fn check_agent_profiles(config: &Config, all_passed: &mut bool) {
    let count = config.agents.agents.len();
    let ok = count > 0;
    print_check(
        "Agent profiles configured",
        ok,
        if ok { format!("{count} profile(s)") } else { "none configured".into() },
    );
    if !ok {
        *all_passed = false;
    }
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
