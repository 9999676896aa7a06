use crate::corpus::TrainingSet;
use crate::data::Instances;
use crate::error::{CpdpError, Result};
use crate::strategy::{PointWiseProcessor, SetWiseProcessor};
use crate::utils::mean_and_std;

/// Turns defect counts into defect presence (label > 0 becomes 1).
/// Usable at set-wise and point-wise positions.
pub struct BinaryClass;

/// Standardizes every feature of every table with the table's own mean and deviation.
pub struct ZScore;

/// Replaces every value x by sign(x) * ln(1 + |x|).
pub struct LogTransform;

pub fn binary_class(mut data: Instances) -> Instances {
    data.y.iter_mut().for_each(|y| *y = if *y > 0.0 { 1.0 } else { 0.0 });
    data
}

pub fn zscore(mut data: Instances) -> Instances {
    for j in 0..data.features.len() {
        let (mean, std) = mean_and_std(&data.column_values(j));
        for row in data.X.iter_mut() {
            row[j] = if std > 0.0 { (row[j] - mean) / std } else { row[j] - mean };
        }
    }
    data
}

pub fn log_transform(mut data: Instances) -> Instances {
    for row in data.X.iter_mut() {
        for v in row.iter_mut() {
            *v = v.signum() * v.abs().ln_1p();
        }
    }
    data
}

fn apply_setwise(f: fn(Instances) -> Instances, test: &mut Instances, training: TrainingSet) -> Result<TrainingSet> {
    *test = f(std::mem::replace(test, Instances::new(Vec::new(), "")));
    training.map_data(|d| Ok::<Instances, CpdpError>(f(d)))
}

fn apply_pointwise(f: fn(Instances) -> Instances, test: &mut Instances, training: Instances) -> Result<Instances> {
    *test = f(std::mem::replace(test, Instances::new(Vec::new(), "")));
    Ok(f(training))
}

macro_rules! both_positions {
    ($strategy:ident, $f:ident) => {
        impl SetWiseProcessor for $strategy {
            fn name(&self) -> &str { stringify!($strategy) }
            fn apply(&self, test: &mut Instances, training: TrainingSet) -> Result<TrainingSet> {
                apply_setwise($f, test, training)
            }
        }

        impl PointWiseProcessor for $strategy {
            fn name(&self) -> &str { stringify!($strategy) }
            fn apply(&self, test: &mut Instances, training: Instances) -> Result<Instances> {
                apply_pointwise($f, test, training)
            }
        }
    };
}

both_positions!(BinaryClass, binary_class);
both_positions!(ZScore, zscore);
both_positions!(LogTransform, log_transform);
