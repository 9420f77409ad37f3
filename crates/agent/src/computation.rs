use dossier_core::{InvestigationLog, ParsedPricing, SavingsCheck};
use dossier_sandbox::Sandbox;

pub fn savings_command(pricing: &ParsedPricing) -> String {
    format!("python3 -c 'print({} - {})'", pricing.asking_price(), pricing.target_offer())
}

/// Computes `asking - target` with the sandbox interpreter. Any anomaly leaves the amount at
/// zero and unverified.
pub async fn verify_savings(
    sandbox: &dyn Sandbox,
    pricing: &ParsedPricing,
    log: &mut InvestigationLog,
) -> SavingsCheck {
    log.push("🧮 Running calculation in Sandbox...");

    let output = match sandbox.run(&savings_command(pricing)).await {
        Ok(output) => output,
        Err(error) => {
            log.warn(format!("❌ Error inside sandbox logic: {error}"));
            return SavingsCheck::unavailable();
        }
    };

    if !output.succeeded() {
        log.warn(format!(
            "⚠️ Calculation exited with code {}: {}",
            output.exit_code,
            output.stderr.trim()
        ));
        return SavingsCheck::unavailable();
    }

    match output.stdout.trim().parse::<i64>() {
        Ok(amount) => {
            log.push(format!("✅ Math Result: {amount}"));
            SavingsCheck::verified(amount)
        }
        Err(_) => {
            log.warn(format!("⚠️ Calculation output was not a number: {:?}", output.stdout.trim()));
            SavingsCheck::unavailable()
        }
    }
}
