//! Pure routing of rumqttc events onto session state changes

use super::connection::SessionState;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use rumqttc::Outgoing;

/// Pure routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to the part of the session it affects
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::PubAck(_) => EventRoute::PublishAcknowledged,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Session state a route moves to, if any
    pub fn next_state(route: &EventRoute) -> Option<SessionState> {
        match route {
            EventRoute::ConnectionAcknowledged => Some(SessionState::Up),
            EventRoute::Disconnected => {
                Some(SessionState::Down("Broker disconnected".to_string()))
            }
            EventRoute::DisconnectSent => {
                Some(SessionState::Down("Client disconnected".to_string()))
            }
            _ => None,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck received; rumqttc reports refused connections as poll errors instead
    ConnectionAcknowledged,
    /// Broker sent DISCONNECT
    Disconnected,
    /// Our DISCONNECT was flushed to the broker
    DisconnectSent,
    /// QoS 1 publish confirmed
    PublishAcknowledged,
    /// Other incoming packet (PingResp, SubAck, ...)
    InfrastructureEvent(String),
    /// Outgoing packet notification
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode};

    #[test]
    fn test_connack_routes_to_up() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));

        let route = MessageHandler::route_mqtt_event(&event);
        assert_eq!(route, EventRoute::ConnectionAcknowledged);
        assert_eq!(MessageHandler::next_state(&route), Some(SessionState::Up));
    }

    #[test]
    fn test_pingresp_does_not_change_state() {
        let event = Event::Incoming(Packet::PingResp(rumqttc::v5::mqttbytes::v5::PingResp));
        let route = MessageHandler::route_mqtt_event(&event);

        assert!(matches!(route, EventRoute::InfrastructureEvent(_)));
        assert_eq!(MessageHandler::next_state(&route), None);
    }

    #[test]
    fn test_outgoing_routes_to_outgoing() {
        let event = Event::Outgoing(Outgoing::PingReq);
        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_outgoing_disconnect_ends_session() {
        let event = Event::Outgoing(Outgoing::Disconnect);
        let route = MessageHandler::route_mqtt_event(&event);

        assert_eq!(route, EventRoute::DisconnectSent);
        assert!(matches!(
            MessageHandler::next_state(&route),
            Some(SessionState::Down(_))
        ));
    }

    #[test]
    fn test_disconnect_route_goes_down() {
        assert!(matches!(
            MessageHandler::next_state(&EventRoute::Disconnected),
            Some(SessionState::Down(_))
        ));
    }
}
