//! 一次完整就诊的演示：分诊、病史、诊断、发药、未执行退库、出院
//!
//! 运行：`cargo run -p ed-workflow --example visit_demo`

use ed_core::{
    Actor, MotiveOfVisit, NewMedication, NewPatient, OrderInstructions, OrderStatus,
    PersonalHistory, PhysicalExam, RecordFields, Role, TriageColor, TriageLocation, VisitOutcome,
    WorkflowPolicy,
};
use ed_workflow::{ClinicalEngine, DiagnosisInput, DispenseInput, MemoryStore, TriageInput};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,ed_workflow=debug")
        .init();

    let engine = ClinicalEngine::new(MemoryStore::new(), WorkflowPolicy::default());
    let doctor = Actor::new("res-01", "Dra. Rivas", Role::Resident);
    let nurse = Actor::new("enf-04", "Lcda. Pérez", Role::Nurse);
    let pharmacist = Actor::new("far-02", "Farm. Gómez", Role::Pharmacy);

    engine
        .register_patient(NewPatient {
            national_id: "V123".into(),
            full_name: "Ana Pérez".into(),
            birth_date: None,
            phone: None,
            address: None,
        })
        .await?;

    let m1 = engine
        .register_medication(NewMedication {
            name: "Ceftriaxona".into(),
            active_ingredient: Some("ceftriaxona".into()),
            concentration: Some("1g".into()),
            presentation: Some("vial".into()),
            minimum_stock: 10,
            expiry_date: None,
        })
        .await?;
    engine.stock_in(m1.id, 10, Some("recepción de pedido"), &pharmacist).await?;

    let triage = engine
        .register_triage(
            "V123",
            &TriageInput {
                color: TriageColor::Yellow,
                location: TriageLocation::Chairs,
                admission_reason: Some("fiebre y disuria".into()),
                vital_signs: Some("T 38.9, FC 104".into()),
            },
            &nurse,
        )
        .await?;
    engine
        .attend_triage(triage.id, Some(TriageLocation::Corridor1), &doctor)
        .await?;

    for fields in [
        RecordFields::Motive(MotiveOfVisit {
            reason: Some("fiebre de 3 días".into()),
        }),
        RecordFields::PhysicalExam(PhysicalExam {
            area: Some("Abdomen".into()),
            findings: Some("puño percusión positiva".into()),
        }),
        RecordFields::PersonalHistory(PersonalHistory {
            category: Some("quirúrgicos".into()),
            detail: Some("niega".into()),
        }),
    ] {
        engine.record_clinical("V123", fields, &doctor).await?;
    }

    let outcome = engine
        .record_diagnosis(
            "V123",
            DiagnosisInput {
                diagnosis: ed_core::Diagnosis {
                    definitive_diagnosis: Some("pielonefritis aguda".into()),
                },
                instructions: OrderInstructions {
                    medication_requirement: Some("ceftriaxona 1g EV".into()),
                    course_of_action: Some("observación".into()),
                    ..Default::default()
                },
                medication_id: Some(m1.id),
            },
            &doctor,
        )
        .await?;
    let order = outcome
        .order
        .ok_or_else(|| anyhow::anyhow!("diagnosis did not create an order"))?;
    info!(folder_id = outcome.folder_id, order_id = order.id, "Diagnosis recorded");

    let receipt = engine
        .request_dispense(
            &DispenseInput {
                order_id: order.id,
                medication_id: m1.id,
                quantity: 4,
            },
            &nurse,
        )
        .await?;
    info!(
        request_id = receipt.request.id,
        stock = receipt.stock.medication.available_quantity,
        "Dispensed"
    );

    let reverted = engine
        .record_order_outcome(order.id, OrderStatus::NotPerformed, Some("vía periférica no disponible"), &nurse)
        .await?;
    info!(reversals = reverted.reversals.len(), "Order not performed");

    let update = engine
        .finalize_triage(triage.id, VisitOutcome::Discharged, &doctor)
        .await?;
    if let Some(closure) = update.closure {
        info!(
            folder_id = closure.folder_id,
            cancelled = closure.cancelled_orders.len(),
            "Visit closed"
        );
    }

    let history = engine.history("V123").await?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
