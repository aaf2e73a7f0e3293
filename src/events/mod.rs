use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Sale lifecycle
    SaleCompleted {
        sale_id: i64,
        branch_id: i64,
        invoice_number: String,
    },
    SaleVoided {
        sale_id: i64,
        branch_id: i64,
    },
    SaleRefunded {
        sale_id: i64,
        branch_id: i64,
        refund_number: String,
    },

    // Voucher administration
    VoucherCreated { voucher_id: i64, code: String },
    VoucherUpdated { voucher_id: i64 },
    VoucherDeleted { voucher_id: i64 },
}

/// Drains the event channel and logs each event. Hook point for future
/// consumers (webhooks, reporting exports).
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::SaleCompleted {
                sale_id,
                branch_id,
                invoice_number,
            } => {
                info!(
                    sale_id,
                    branch_id,
                    invoice_number = %invoice_number,
                    "Sale completed"
                );
            }
            Event::SaleVoided { sale_id, branch_id } => {
                info!(sale_id, branch_id, "Sale voided");
            }
            Event::SaleRefunded {
                sale_id,
                branch_id,
                refund_number,
            } => {
                info!(sale_id, branch_id, refund_number = %refund_number, "Sale refunded");
            }
            Event::VoucherCreated { voucher_id, code } => {
                info!(voucher_id, code = %code, "Voucher created");
            }
            Event::VoucherUpdated { voucher_id } => {
                info!(voucher_id, "Voucher updated");
            }
            Event::VoucherDeleted { voucher_id } => {
                info!(voucher_id, "Voucher deleted");
            }
        }
    }

    info!("Event processing loop stopped");
}
