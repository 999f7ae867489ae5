use crate::infra::{sample_registry, Registry, SAMPLE_COMPANY};
use clap::{Args, ValueEnum};
use serde::Serialize;
use corp_registry::config::RegistryConfig;
use corp_registry::error::AppError;
use corp_registry::workflows::registry::{
    blueprint, ActionCommand, Actor, ActorRole, ApplicationRecord, ApplicationStatus,
    ApplicationStatusView, ChangeIntent, CompanyId, ConsentDecision, ConsentSummary,
    DeregistrationIntent, RenameIntent, SubmitRequest,
};

const APPLICANT: &str = "alice";
const REVIEWER: &str = "registrar";
const SHAREHOLDERS: [&str; 3] = ["alice", "bruno", "chen"];

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum Scenario {
    /// Wind the sample company up
    #[default]
    Deregistration,
    /// Rename the sample company
    Rename,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Change application to walk through.
    #[arg(long, value_enum, default_value_t = Scenario::Deregistration)]
    pub(crate) scenario: Scenario,
    /// Shareholder who rejects instead of consenting (alice 50%, bruno 30%, chen 20%).
    #[arg(long)]
    pub(crate) reject_as: Option<String>,
    /// Leave routing to review to the reviewer instead of the system actor.
    #[arg(long)]
    pub(crate) manual_routing: bool,
    /// Print the final application record as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

/// Machine-readable closing snapshot of a demo run.
#[derive(Debug, Serialize)]
struct DemoSummary {
    application: ApplicationStatusView,
    company_status: &'static str,
    company_name: String,
    consent: ConsentSummary,
    audit: Vec<String>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        scenario,
        reject_as,
        manual_routing,
        json,
    } = args;

    let config = RegistryConfig {
        auto_route: !manual_routing,
        ..RegistryConfig::default()
    };
    let registry = sample_registry(&config);
    let company_id = CompanyId(SAMPLE_COMPANY.to_string());

    let intent = match scenario {
        Scenario::Deregistration => ChangeIntent::Deregistration(DeregistrationIntent {
            reason: Some("Owners are retiring the trading business".to_string()),
        }),
        Scenario::Rename => ChangeIntent::Rename(RenameIntent {
            new_name: "Harborview Marine LLC".to_string(),
        }),
    };

    println!("Corporate registry demo");
    let company = registry.company(&company_id)?;
    println!(
        "- {} ({}) is {} with {} shareholders",
        company.name,
        company.id,
        company.status.key(),
        company.shareholders().len()
    );

    let application = registry.submit(
        &Actor::user(APPLICANT, &[]),
        SubmitRequest {
            company_id: Some(company_id.clone()),
            intent,
        },
    )?;
    println!(
        "- {APPLICANT} filed {} as {:?} -> stage {}",
        application.id, application.kind, application.stage
    );
    print_ledger(&registry, &application)?;

    for shareholder in SHAREHOLDERS {
        let approve = reject_as.as_deref() != Some(shareholder);
        let outcome = registry.decide_consent(
            &Actor::user(shareholder, &[]),
            &application.id,
            ConsentDecision {
                approve,
                comment: (!approve).then(|| "Not in favour".to_string()),
            },
        )?;
        println!(
            "  {shareholder} {} -> verdict {} | application {}",
            if approve { "consents" } else { "rejects" },
            outcome.verdict.label(),
            outcome.application.status.key()
        );
        if outcome.terminated {
            println!("  Application closed without review: consent can no longer be reached");
            return finish(&registry, &application, json);
        }
    }

    let reviewer = Actor::user(REVIEWER, &[ActorRole::RegistryAuthority]);
    let current = registry.get(&application.id)?;
    if current.status == ApplicationStatus::Submitted {
        let outcome = registry.perform_action(
            &reviewer,
            &application.id,
            ActionCommand {
                action_key: blueprint::ROUTE_TO_REVIEW.to_string(),
                comment: None,
                payload: None,
            },
        )?;
        println!("- {REVIEWER} routed to {}", outcome.next_state.label);
    }

    let outcome = registry.perform_action(
        &reviewer,
        &application.id,
        ActionCommand {
            action_key: blueprint::APPROVE.to_string(),
            comment: Some("Filing complete".to_string()),
            payload: None,
        },
    )?;
    println!(
        "- {REVIEWER} {} -> application {}",
        outcome.action.action_label.to_lowercase(),
        outcome.application.status.key()
    );

    finish(&registry, &application, json)
}

fn print_ledger(registry: &Registry, application: &ApplicationRecord) -> Result<(), AppError> {
    let view = registry.consent_items(&application.id)?;
    println!("  Consent required from:");
    for item in &view.items {
        println!(
            "    - {} as {}",
            item.requirement.required_user_id,
            item.requirement.role.label()
        );
    }
    Ok(())
}

fn finish(registry: &Registry, application: &ApplicationRecord, json: bool) -> Result<(), AppError> {
    let company = registry.company(&application.company_id)?;
    println!(
        "- Company {} is now {} ({})",
        company.id,
        company.status.key(),
        company.name
    );

    let summary = registry.consent_summary(&application.id)?;
    println!(
        "- Consent: {} approved / {} rejected / {} pending -> {}",
        summary.approved,
        summary.rejected,
        summary.pending,
        summary.verdict.label()
    );

    let trail = registry.audit_trail(&application.company_id)?;
    println!("Audit trail:");
    for record in &trail {
        println!(
            "  - {} {} by {} [{}]",
            record.recorded_at.format("%H:%M:%S"),
            record.action_label,
            record.actor_name.as_deref().unwrap_or(&record.actor_id.0),
            record.state
        );
    }

    if json {
        let summary = DemoSummary {
            application: registry.get(&application.id)?.status_view(),
            company_status: company.status.key(),
            company_name: company.name.clone(),
            consent: summary,
            audit: trail.iter().map(|record| record.action_key.clone()).collect(),
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("Demo summary:\n{json}"),
            Err(err) => println!("Demo summary unavailable: {err}"),
        }
    }
    Ok(())
}
