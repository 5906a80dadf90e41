//! Coordinate-transform broadcasting.

use erratic_types::{BridgeError, EventPayload, TransformStamped};

use crate::node::{Node, Publisher};

/// Topic every transform is published on.
pub const TF_TOPIC: &str = "tf";

/// Publishes [`TransformStamped`] updates on [`TF_TOPIC`].
#[derive(Clone, Debug)]
pub struct TransformBroadcaster {
    publisher: Publisher,
}

impl TransformBroadcaster {
    pub fn new(node: &Node) -> Self {
        Self {
            publisher: node.advertise(TF_TOPIC),
        }
    }

    pub fn send_transform(&self, transform: TransformStamped) -> Result<usize, BridgeError> {
        self.publisher.publish(EventPayload::Transform(transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use erratic_types::{Header, Quaternion, Vector3};

    #[tokio::test]
    async fn transforms_land_on_tf_topic() {
        let node = Node::new("tf-test", EventBus::default());
        let mut rx = node.bus().subscribe_to(TF_TOPIC);
        let tf = TransformBroadcaster::new(&node);

        let sent = TransformStamped {
            header: Header {
                frame_id: "odom".to_string(),
                ..Header::default()
            },
            child_frame_id: "base_footprint".to_string(),
            translation: Vector3::new(1.0, 2.0, 0.0),
            rotation: Quaternion::from_yaw(0.5),
        };
        assert_eq!(tf.send_transform(sent.clone()).unwrap(), 1);

        let event = rx.recv().await.unwrap();
        match event.payload {
            EventPayload::Transform(received) => assert_eq!(received, sent),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
