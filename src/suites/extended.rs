//! `extended` suite: counter options and control, timers, dynamic mappings, persistence

use super::{counter_command, BenchProfile};
use crate::core::dispatcher::Command;
use crate::core::suite::{Precondition, TestCase, TestSuite};
use crate::core::verify::{Expectation, Relation, Template, Tolerance};

/// Build the `extended` suite
pub fn extended(profile: &BenchProfile) -> TestSuite {
    TestSuite::new(
        "extended",
        "Prescaler, scale, direction, start value, counter control, timers, dynamic mappings, NVS",
    )
    .case(ratio(
        profile,
        "CNT-HW-05",
        "Prescaler 4 test",
        "edge:rising prescaler:4 index-reg:10 raw-reg:11 freq-reg:12 ctrl-reg:14",
        4.0,
        0.5,
    ))
    .case(ratio(
        profile,
        "CNT-HW-06",
        "Scale 2.5 test",
        "edge:rising prescaler:1 scale:2.5 index-reg:10 raw-reg:11 ctrl-reg:14",
        2.5,
        0.2,
    ))
    .case(
        TestCase::new("CNT-HW-07", "Direction DOWN test")
            .send(
                counter_command("edge:rising prescaler:1 direction:down start-value:10000 index-reg:10 ctrl-reg:14"),
                profile.configure_wait,
            )
            .send("read reg 10 1", profile.read_wait)
            .probe("initial", Template::register(10))
            .delay(profile.window(0.3))
            .send("read reg 10 1", profile.read_wait)
            .probe("final", Template::register(10))
            .relate(Relation::LessThan, ["final", "initial"]),
    )
    .case(
        TestCase::new("CNT-HW-08", "Start value 5000")
            .send(
                counter_command("edge:rising prescaler:1 start-value:5000 index-reg:10 ctrl-reg:14"),
                profile.configure_wait,
            )
            .send("write reg 14 value 1", profile.read_wait)
            .delay(profile.settle)
            .send("read reg 10 1", profile.read_wait)
            .expect(Expectation::numeric(
                Template::register(10),
                5000.0,
                Tolerance::Absolute(100.0),
            ))
            .known_flaky("start-value race: pulses keep arriving between reset and read"),
    )
    .case(
        TestCase::new("CTL-01", "Counter reset via ctrl-reg")
            .send(
                counter_command("edge:rising prescaler:1 index-reg:10 ctrl-reg:14"),
                profile.configure_wait,
            )
            .delay(profile.window(0.2))
            .send("read reg 10 1", profile.read_wait)
            .probe("before", Template::register(10))
            .send("write reg 14 value 1", profile.read_wait)
            .delay(profile.settle)
            .send("read reg 10 1", profile.read_wait)
            .probe("after", Template::register(10))
            .relate(Relation::LessThan, ["after", "before"]),
    )
    .case(
        TestCase::new("CTL-06", "Counter stop via ctrl-reg")
            .precondition(counter_running(profile))
            .send("write reg 14 value 4", profile.read_wait)
            .delay(profile.settle)
            .send("read reg 10 1", profile.read_wait)
            .probe("at_stop", Template::register(10))
            .delay(profile.window(0.2))
            .send("read reg 10 1", profile.read_wait)
            .probe("later", Template::register(10))
            .relate(
                Relation::Within {
                    tolerance: Tolerance::Absolute(100.0),
                },
                ["later", "at_stop"],
            ),
    )
    .case(astable(profile))
    .case(
        TestCase::new("REG-DY-02", "Dynamic reg counter1:freq")
            .send(
                counter_command("edge:rising prescaler:1 index-reg:10 freq-reg:12"),
                profile.configure_wait,
            )
            .send("set reg DYNAMIC 150 counter1:freq", profile.show_wait)
            .delay(profile.window(0.2))
            .send("read reg 12 1", profile.read_wait)
            .probe("direct", Template::register(12))
            .send("read reg 150 1", profile.read_wait)
            .probe("dynamic", Template::register(150))
            .relate(Relation::Equal, ["direct", "dynamic"]),
    )
    .case(
        TestCase::new("COIL-DY-02", "Dynamic coil timer1:output")
            .send(
                format!(
                    "set timer 1 mode 3 parameter on:{half} off:{half} output-coil:200",
                    half = profile.timer_half_period.as_millis() / 2
                ),
                profile.configure_wait,
            )
            .send("set coil DYNAMIC 150 timer1:output", profile.show_wait)
            .delay(profile.settle)
            // one read covers both coils, so they are sampled at the same instant
            .send("read coil 150 51", profile.read_wait)
            .probe("direct", Template::coil(200))
            .probe("dynamic", Template::coil(150))
            .relate(Relation::Equal, ["direct", "dynamic"]),
    )
    .case(
        TestCase::new("SYS-06", "Save config to NVS")
            .send("write reg 100 value 54321", profile.read_wait)
            .send("save", profile.configure_wait)
            .expect(Expectation::matches(r"(?i)saved")),
    )
    .case(
        TestCase::new("SYS-07", "Load config from NVS")
            .send("write reg 100 value 99999", profile.read_wait)
            .send("load", profile.configure_wait)
            .expect(Expectation::matches(r"(?i)loaded"))
            .send("read reg 100 1", profile.read_wait)
            .advise(
                "restored",
                Expectation::numeric(Template::register(100), 54321.0, Tolerance::Absolute(0.0)),
            ),
    )
    .case(
        TestCase::new("SYS-03", "Set slave ID to 42")
            .send("set id 42", profile.read_wait)
            .send("show config", profile.show_wait)
            .expect(Expectation::line_with_all(["Unit-ID", "42"]))
            .send("set id 20", profile.read_wait)
            .advise("restore", Expectation::contains("20")),
    )
}

fn counter_running(profile: &BenchProfile) -> Precondition {
    Precondition::new(
        "counter 1 configured",
        Command::new("show counters", profile.show_wait),
        Expectation::contains("counter 1: value="),
    )
}

/// Scaled over raw count after counting for half the window
fn ratio(profile: &BenchProfile, id: &str, description: &str, parameters: &str, expected: f64, band: f64) -> TestCase {
    TestCase::new(id, description)
        .send(counter_command(parameters), profile.configure_wait)
        .send("write reg 14 value 1", profile.read_wait)
        .delay(profile.window(0.5))
        .send("read reg 10 2", profile.read_wait)
        .probe("scaled", Template::register(10))
        .probe("raw", Template::register(11))
        .relate(
            Relation::RatioWithin {
                expected,
                tolerance: Tolerance::Absolute(band),
            },
            ["scaled", "raw"],
        )
}

fn astable(profile: &BenchProfile) -> TestCase {
    let half = profile.timer_half_period.as_millis();
    let mut case = TestCase::new("TIM-03-01", "Timer Mode 3 astable toggle").send(
        format!("set timer 1 mode 3 parameter on:{half} off:{half} output-coil:200"),
        profile.configure_wait,
    );
    let labels: Vec<String> = (0..5).map(|i| format!("coil200#{i}")).collect();
    for label in &labels {
        case = case
            .send("read coil 200 1", profile.read_wait)
            .probe(label.clone(), Template::coil(200))
            .delay(profile.sample_interval);
    }
    case.relate(Relation::Toggles, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::suite::Step;

    #[test]
    fn test_catalog_shape() {
        let suite = extended(&BenchProfile::default());
        assert_eq!(suite.len(), 12);
        assert!(suite.get("CNT-HW-08").unwrap().known_flaky.is_some());
        assert!(suite.get("CNT-HW-07").unwrap().known_flaky.is_none());
    }

    #[test]
    fn test_set_id_is_restored() {
        let suite = extended(&BenchProfile::default());
        let commands: Vec<&str> = suite.get("SYS-03").unwrap().commands().map(|c| c.text.as_str()).collect();
        assert_eq!(commands.last(), Some(&"set id 20"));
    }

    #[test]
    fn test_astable_probes_five_samples() {
        let case = astable(&BenchProfile::hardware(1000.0));
        let probes = case.steps.iter().filter(|s| matches!(s, Step::Probe { .. })).count();
        assert_eq!(probes, 5);
        assert!(matches!(
            case.steps.last(),
            Some(Step::Relate { relation: Relation::Toggles, operands, .. }) if operands.len() == 5
        ));
    }
}
