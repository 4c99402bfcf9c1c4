#[cfg(not(feature = "serde"))]
fn main() {
    println!("enable the `serde` feature: cargo run --example save_load_json --features serde");
}

#[cfg(feature = "serde")]
fn main() -> rust_autoencoder::Result<()> {
    use rust_autoencoder::{AutoEncoder, AutoEncoderBuilder, Samples, TrainConfig};

    let rows: Vec<Vec<f32>> = (0..64)
        .map(|i| (0..16).map(|j| if (i + j) % 4 == 0 { 1.0 } else { 0.0 }).collect())
        .collect();
    let x = Samples::from_rows(&rows)?;

    let mut model = AutoEncoderBuilder::new(16, 4)?.batch_norm(true).build()?;
    model.train(
        &x,
        None,
        &mut [],
        &TrainConfig {
            epochs: 20,
            batch_size: 16,
            ..TrainConfig::default()
        },
    )?;

    let path = "target/tmp_autoencoder.json";
    model.save_json(path)?;

    let loaded = AutoEncoder::load_json(path)?;
    assert_eq!(loaded.predict(&x)?, model.predict(&x)?);
    println!("saved and loaded model: {path}");
    Ok(())
}
