use multiscale::{AttributeKind, AttributeSpec, DatasetBuilder, Model, ModelConfig, TimeKind};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two weeks of hourly readings from a machine that runs during office
    // hours on weekdays and idles otherwise.
    let mut builder = DatasetBuilder::new(vec![
        AttributeSpec::new("time", AttributeKind::Time(TimeKind::Time)).with_label("Time"),
        AttributeSpec::new("load", AttributeKind::NumericFloat).with_label("Load"),
        AttributeSpec::new("mode", AttributeKind::CategoricalString).with_label("Mode"),
    ])?;

    // 2024-01-01 is a Monday.
    for day in 0..14u32 {
        let weekday = day % 7 < 5;
        for hour in 0..24u32 {
            let working = weekday && (9..17).contains(&hour);
            let load = if working {
                70.0 + f64::from((hour * 7 + day) % 11)
            } else {
                5.0 + f64::from((hour + day) % 4)
            };
            let mode = if working { "run" } else { "idle" };
            let time = format!("2024-01-{:02} {hour:02}:00:00", day + 1);
            builder.push_row(&[time.into(), load.into(), mode.into()]);
        }
    }
    let dataset = builder.build()?;

    let config = ModelConfig::new(12).with_histogram_buckets(8);
    let model = Model::build(dataset, &config)?;

    for scale in model.scales() {
        println!("{} states:", scale.n_states());
        for (pos, &id) in scale.states.iter().enumerate() {
            let state = model.state(id);
            let label = state.label.as_ref().map_or("?", |l| l.label.as_str());
            println!(
                "  [{pos}] {label:<24} members={:<4} p={:.3} at ({:.2}, {:.2})",
                state.n_members(),
                scale.stationary[pos],
                state.x,
                state.y
            );
        }
    }

    let json = model.to_json()?;
    println!("exported {} bytes of JSON", json.len());
    Ok(())
}
