use serde::{Deserialize, Serialize};

/// The named annotation groups of the face mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Region {
    SilhouetteOuter,
    LipsUpperOuter,
    LipsLowerOuter,
    LipsUpperInner,
    LipsLowerInner,
    RightEyeUpper0,
    RightEyeLower0,
    RightEyeUpper1,
    RightEyeLower1,
    RightEyeUpper2,
    RightEyeLower2,
    RightEyeLower3,
    RightEyebrowUpper,
    RightEyebrowLower,
    RightEyeIris,
    LeftEyeUpper0,
    LeftEyeLower0,
    LeftEyeUpper1,
    LeftEyeLower1,
    LeftEyeUpper2,
    LeftEyeLower2,
    LeftEyeLower3,
    LeftEyebrowUpper,
    LeftEyebrowLower,
    LeftEyeIris,
    MidwayBetweenEyes,
    NoseTip,
    NoseBottom,
    NoseRightCorner,
    NoseLeftCorner,
    RightCheek,
    LeftCheek,
}

impl Region {
    /// Returns the amount of points the detector reports for the eye regions.
    pub fn expected_len(self) -> Option<usize> {
        use Region::*;

        let len = match self {
            LeftEyeIris | RightEyeIris => 5,
            LeftEyeUpper0 | LeftEyeUpper1 | LeftEyeUpper2 => 7,
            RightEyeUpper0 | RightEyeUpper1 | RightEyeUpper2 => 7,
            LeftEyeLower0 | LeftEyeLower1 | LeftEyeLower2 | LeftEyeLower3 => 9,
            RightEyeLower0 | RightEyeLower1 | RightEyeLower2 | RightEyeLower3 => 9,
            _ => return None,
        };

        Some(len)
    }
}

/// One of the two eyes, from the subject's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub fn iris(self) -> Region {
        match self {
            Eye::Left => Region::LeftEyeIris,
            Eye::Right => Region::RightEyeIris,
        }
    }

    /// The `n`th upper ring around the eye, `0` being the eyelid.
    pub fn upper(self, n: usize) -> Option<Region> {
        use Region::*;

        let region = match (self, n) {
            (Eye::Left, 0) => LeftEyeUpper0,
            (Eye::Left, 1) => LeftEyeUpper1,
            (Eye::Left, 2) => LeftEyeUpper2,
            (Eye::Right, 0) => RightEyeUpper0,
            (Eye::Right, 1) => RightEyeUpper1,
            (Eye::Right, 2) => RightEyeUpper2,
            _ => return None,
        };

        Some(region)
    }

    /// The `n`th lower ring around the eye, `0` being the eyelid.
    pub fn lower(self, n: usize) -> Option<Region> {
        use Region::*;

        let region = match (self, n) {
            (Eye::Left, 0) => LeftEyeLower0,
            (Eye::Left, 1) => LeftEyeLower1,
            (Eye::Left, 2) => LeftEyeLower2,
            (Eye::Left, 3) => LeftEyeLower3,
            (Eye::Right, 0) => RightEyeLower0,
            (Eye::Right, 1) => RightEyeLower1,
            (Eye::Right, 2) => RightEyeLower2,
            (Eye::Right, 3) => RightEyeLower3,
            _ => return None,
        };

        Some(region)
    }

    /// The eyelid outline groups in the order they are concatenated.
    pub fn outline(self) -> [Region; 2] {
        match self {
            Eye::Left => [Region::LeftEyeUpper0, Region::LeftEyeLower0],
            Eye::Right => [Region::RightEyeLower0, Region::RightEyeUpper0],
        }
    }

    /// The index of this eye's iris center in the dense mesh.
    pub fn iris_center_index(self) -> usize {
        match self {
            Eye::Left => super::NUM_KEYPOINTS,
            Eye::Right => super::NUM_KEYPOINTS + super::NUM_IRIS_KEYPOINTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_use_mesh_names() {
        let json = serde_json::to_string(&Region::LeftEyeUpper0).unwrap();
        assert_eq!(json, "\"leftEyeUpper0\"");

        let region: Region = serde_json::from_str("\"rightEyeIris\"").unwrap();
        assert_eq!(region, Region::RightEyeIris);
    }

    #[test]
    fn iris_centers_follow_the_mesh() {
        assert_eq!(Eye::Left.iris_center_index(), 468);
        assert_eq!(Eye::Right.iris_center_index(), 473);
        assert_eq!(Eye::Left.lower(4), None);
    }
}
