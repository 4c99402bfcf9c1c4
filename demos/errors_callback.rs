//! Record train/test reconstruction error per epoch with `ErrorsCallback`.

use rust_autoencoder::{AutoEncoderBuilder, ErrorsCallback, Samples, TrainConfig};

fn split(len: usize, dim: usize, seed: usize) -> rust_autoencoder::Result<Samples> {
    let values = (0..len * dim)
        .map(|i| (((i + seed) * 31) % 97) as f32 / 96.0)
        .collect();
    Samples::from_flat(values, dim)
}

fn main() -> rust_autoencoder::Result<()> {
    env_logger::init();

    let x_train = split(400, 16, 0)?;
    let x_test = split(100, 16, 7)?;

    let mut model = AutoEncoderBuilder::new(16, 4)?.build()?;
    let mut errors = ErrorsCallback::autoencoding(x_train.clone(), x_test)?;

    model.train(
        &x_train,
        None,
        &mut [&mut errors],
        &TrainConfig::with_epochs(10),
    )?;

    for (epoch, (train, test)) in errors
        .mse_train()
        .iter()
        .zip(errors.mse_test())
        .enumerate()
    {
        println!("epoch {:>2}: train={train:.5} test={test:.5}", epoch + 1);
    }
    Ok(())
}
