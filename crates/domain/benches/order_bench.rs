use chrono::Utc;
use common::ActorId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Money, Order, OrderCharges, OrderItem, OrderStatus, PaymentMethod, ProductId, RefundRequest,
};

fn items(count: usize) -> Vec<OrderItem> {
    (0..count)
        .map(|i| OrderItem {
            product_id: ProductId::new(format!("SKU-{:03}", i)),
            name: format!("Product {}", i),
            quantity: 2,
            unit_price: Money::from_cents(1500),
            discount_unit_price: Some(Money::from_cents(1200)),
            size: Some("M".to_string()),
            color: Some("Red".to_string()),
        })
        .collect()
}

fn bench_create_order(c: &mut Criterion) {
    let lines = items(10);

    c.bench_function("domain/create_order_10_items", |b| {
        b.iter(|| {
            Order::create(
                ActorId::new(),
                lines.clone(),
                "ADDR-BENCH",
                PaymentMethod::Card,
                OrderCharges::default(),
                false,
                Utc::now(),
            )
            .unwrap()
        });
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let lines = items(5);

    c.bench_function("domain/lifecycle_to_refund", |b| {
        b.iter(|| {
            let now = Utc::now();
            let mut order = Order::create(
                ActorId::new(),
                lines.clone(),
                "ADDR-BENCH",
                PaymentMethod::Upi,
                OrderCharges::default(),
                false,
                now,
            )
            .unwrap();

            order.record_payment_success(Some("TXN-BENCH".to_string()), now).unwrap();
            order
                .transition_order_status(OrderStatus::Processing, None, now)
                .unwrap();
            order
                .apply_refund(
                    RefundRequest {
                        refund_id: "REF-BENCH".to_string(),
                        amount: order.total_amount(),
                        reason: "bench".to_string(),
                    },
                    now,
                )
                .unwrap();
            order.restoration_adjustments()
        });
    });
}

criterion_group!(benches, bench_create_order, bench_full_lifecycle);
criterion_main!(benches);
