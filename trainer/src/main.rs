// trainer/src/main.rs
use anyhow::{ensure, Context, Result};
use digit_softmax::bundle::{Metadata, Metrics, ModelBundle};
use digit_softmax::datasets::{self, Split, NUM_CLASSES};
use digit_softmax::{
    confusion_matrix, extract_batch, format_confusion_matrix, format_history_table, logging,
    Pca, SoftmaxRegression, TrainConfig, Trainer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use tracing::{info, Level};

fn main() -> Result<()> {
    logging::init(Level::INFO);
    let config = TrainConfig::default();
    info!("=== Softmax Regression Training ===");

    datasets::ensure_downloaded(&config.data_dir, &config.mirrors)
        .context("fetching MNIST")?;

    let mut train = datasets::load_split(&config.data_dir, Split::Train)
        .context("loading training split")?;
    let mut test = datasets::load_split(&config.data_dir, Split::Test)
        .context("loading test split")?;
    info!(train = train.len(), test = test.len(), "dataset loaded");

    train.truncate(config.train_samples);
    test.truncate(config.val_samples);
    ensure!(!train.is_empty(), "no training samples");

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(features = %config.feature_kind, seed, "extracting features");
    let x_train_raw = extract_batch(config.feature_kind, &train.images);
    let x_test_raw = extract_batch(config.feature_kind, &test.images);

    info!(n_components = config.n_components, "fitting PCA");
    let pca = Pca::fit(&x_train_raw, config.n_components, seed).context("fitting PCA")?;
    info!(
        "PCA: {} -> {} dims, {:.2}% variance explained",
        pca.input_dim(),
        pca.n_components,
        pca.variance_explained() * 100.0
    );
    let x_train = pca.transform(&x_train_raw)?;
    let x_test = pca.transform(&x_test_raw)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = SoftmaxRegression::new(
        pca.n_components,
        NUM_CLASSES,
        config.learning_rate,
        config.reg_lambda,
        &mut rng,
    );
    info!("{}", model);

    let history = Trainer::new(config.epochs, config.batch_size, Some(seed))
        .with_log_every(config.log_every)
        .fit(&mut model, &x_train, &train.labels, &x_test, &test.labels)
        .context("training")?;
    info!("\n{}", format_history_table(&history, config.log_every));

    let predictions = model.predict(&x_test)?;
    let cm = confusion_matrix(&predictions, &test.labels, NUM_CLASSES);
    info!("confusion matrix:\n{}", format_confusion_matrix(&cm));

    let last = history.last().context("no epochs were run")?;
    let mut extra = Map::new();
    extra.insert("final_train_loss".into(), Value::from(last.train_loss));
    extra.insert("final_val_loss".into(), Value::from(last.val_loss));
    let metrics = Metrics {
        accuracy: last.val_accuracy,
        extra,
    };
    let mut meta_extra = Map::new();
    meta_extra.insert("train_samples".into(), Value::from(train.len()));
    meta_extra.insert("val_samples".into(), Value::from(test.len()));
    meta_extra.insert("epochs".into(), Value::from(config.epochs));
    meta_extra.insert("batch_size".into(), Value::from(config.batch_size));
    meta_extra.insert("seed".into(), Value::from(seed));
    let metadata = Metadata {
        feature_kind: config.feature_kind,
        extra: meta_extra,
        ..Metadata::default()
    };

    let bundle = ModelBundle::new(&model, pca, metrics, metadata);
    bundle
        .save(&config.model_path)
        .with_context(|| format!("saving {}", config.model_path.display()))?;
    history
        .write_csv(&config.history_path)
        .with_context(|| format!("writing {}", config.history_path.display()))?;

    info!("{}", "=".repeat(50));
    info!("Final Test Accuracy ({}): {:.4}", config.feature_kind, last.val_accuracy);
    info!("{}", "=".repeat(50));
    info!(path = %config.model_path.display(), "model trained and saved");
    Ok(())
}
