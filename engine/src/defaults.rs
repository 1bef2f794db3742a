use crate::model::{Direction, Model, Stream};
use tracing::{debug, warn};

/// First stream, in device order, with controls in the given direction.
pub fn pick_default(model: &Model, direction: Direction) -> Option<&Stream> {
    model.devices().find_map(|device| {
        model
            .device_streams(device.name())
            .find(|s| s.direction() == direction && !s.controls().is_empty())
    })
}

/// Re-runs the selection for both directions after a topology change,
/// clearing a default nothing qualifies for. Returns whether anything changed.
pub(crate) fn reselect_defaults(model: &mut Model) -> bool {
    let mut changed = false;
    for direction in [Direction::Input, Direction::Output] {
        let name = pick_default(model, direction).map(|s| s.name().to_string());
        match model.set_default(direction, name.clone()) {
            Ok(true) => {
                debug!("default {:?} stream is now {:?}", direction, name);
                changed = true;
            }
            Ok(false) => {}
            Err(e) => warn!("failed to select default {:?} stream: {}", direction, e),
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MixerEvent;
    use crate::model::{Control, ControlFlags, ControlRole, Device, Switch, SwitchRef};

    fn add_card(model: &mut Model, card: &str) {
        model.add_device(Device::new(card, card)).unwrap();
        for (suffix, direction) in [("in", Direction::Input), ("out", Direction::Output)] {
            model
                .insert_stream(
                    Stream::new(format!("{card}-{suffix}"), card, direction)
                        .with_device(Some(card.to_string())),
                )
                .unwrap();
        }
    }

    fn control(name: &str) -> Control {
        Control::new(name, name, ControlRole::Master)
            .with_flags(ControlFlags::full())
            .with_channels(vec![crate::channel::ChannelPosition::Mono], vec![10])
    }

    #[test]
    fn picks_first_device_with_controls() {
        let mut model = Model::new();
        add_card(&mut model, "card0");
        add_card(&mut model, "card1");
        model.add_control("card1-out", control("Master")).unwrap();
        assert!(reselect_defaults(&mut model));
        assert_eq!(model.default_output_stream().unwrap().name(), "card1-out");
        assert!(model.default_input_stream().is_none());

        model.add_control("card0-out", control("PCM")).unwrap();
        assert!(reselect_defaults(&mut model));
        assert_eq!(model.default_output_stream().unwrap().name(), "card0-out");
        assert!(!reselect_defaults(&mut model));
    }

    #[test]
    fn switch_only_stream_does_not_qualify() {
        let mut model = Model::new();
        add_card(&mut model, "card0");
        model
            .add_switch(
                SwitchRef::stream("card0-in", "Input Source"),
                Switch::new("Input Source", "Input Source", Default::default()),
            )
            .unwrap();
        reselect_defaults(&mut model);
        assert!(model.stream("card0-in").is_some());
        assert!(model.default_input_stream().is_none());
    }

    #[test]
    fn unsets_when_nothing_qualifies() {
        let mut model = Model::new();
        add_card(&mut model, "card0");
        model.add_control("card0-out", control("Master")).unwrap();
        reselect_defaults(&mut model);
        let mut rx = model.subscribe();

        model.remove_device("card0");
        model.remove_stream("card0-out");
        reselect_defaults(&mut model);
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&MixerEvent::DefaultOutputChanged(None)));
        assert!(model.default_output_stream().is_none());
    }
}
