//! The static mechanism registry. Every mechanism implementation is listed in
//! [`MECHANISM_TABLE`] with the material properties it requires; resolution
//! filters or validates against the supplied settings.

use super::basic::{ConstantRelaxationTime, MeanFreePath};
use super::elastic::{AcousticDeformation, IonizedImpurity};
use super::inelastic::PolarOptical;
use super::ScatteringMechanism;
use crate::error::ConfigurationError;
use crate::settings::{MaterialSettings, MechanismSelection};
use itertools::Itertools;

/// A registry entry: the mechanism name, the material properties it requires
/// and its constructor
pub struct MechanismDescriptor {
    /// Registry name, as accepted by an explicit selection
    pub name: &'static str,
    /// Properties which must be set for the mechanism to be buildable
    pub required_properties: &'static [&'static str],
    build: fn(&MaterialSettings) -> Result<ScatteringMechanism, ConfigurationError>,
}

/// Every mechanism implementation known to the engine
pub const MECHANISM_TABLE: &[MechanismDescriptor] = &[
    MechanismDescriptor {
        name: AcousticDeformation::NAME,
        required_properties: &["deformation_potential", "elastic_constant"],
        build: |settings| {
            Ok(ScatteringMechanism::Elastic(Box::new(
                AcousticDeformation::new(settings)?,
            )))
        },
    },
    MechanismDescriptor {
        name: IonizedImpurity::NAME,
        required_properties: &["static_dielectric"],
        build: |settings| {
            Ok(ScatteringMechanism::Elastic(Box::new(IonizedImpurity::new(
                settings,
            )?)))
        },
    },
    MechanismDescriptor {
        name: PolarOptical::NAME,
        required_properties: &[
            "pop_frequency",
            "static_dielectric",
            "high_frequency_dielectric",
        ],
        build: |settings| {
            Ok(ScatteringMechanism::Inelastic(Box::new(PolarOptical::new(
                settings,
            )?)))
        },
    },
    MechanismDescriptor {
        name: ConstantRelaxationTime::NAME,
        required_properties: &["constant_relaxation_time"],
        build: |settings| {
            Ok(ScatteringMechanism::Basic(Box::new(
                ConstantRelaxationTime::new(settings)?,
            )))
        },
    },
    MechanismDescriptor {
        name: MeanFreePath::NAME,
        required_properties: &["mean_free_path"],
        build: |settings| {
            Ok(ScatteringMechanism::Basic(Box::new(MeanFreePath::new(
                settings,
            )?)))
        },
    },
];

fn descriptor(name: &str) -> Result<&'static MechanismDescriptor, ConfigurationError> {
    MECHANISM_TABLE
        .iter()
        .find(|descriptor| descriptor.name == name)
        .ok_or_else(|| ConfigurationError::UnknownMechanism(name.to_string()))
}

/// Resolve the requested selection into constructed mechanisms.
///
/// Automatic selection includes every mechanism whose required properties are
/// all set and fails only when that leaves none; explicit selection fails on
/// the first unknown name or missing property.
pub fn resolve_mechanisms(
    settings: &MaterialSettings,
) -> Result<Vec<ScatteringMechanism>, ConfigurationError> {
    let mechanisms = match &settings.mechanisms {
        MechanismSelection::Auto => {
            let available: Vec<&MechanismDescriptor> = MECHANISM_TABLE
                .iter()
                .filter(|descriptor| {
                    descriptor
                        .required_properties
                        .iter()
                        .all(|property| settings.property(property).is_some())
                })
                .collect();
            if available.is_empty() {
                return Err(ConfigurationError::NoMechanism);
            }
            available
                .into_iter()
                .map(|descriptor| (descriptor.build)(settings))
                .collect::<Result<Vec<_>, _>>()?
        }
        MechanismSelection::Explicit(names) => names
            .iter()
            .map(|name| {
                let descriptor = descriptor(name)?;
                for property in descriptor.required_properties {
                    if settings.property(property).is_none() {
                        return Err(ConfigurationError::MissingProperty {
                            mechanism: descriptor.name.into(),
                            property: (*property).into(),
                        });
                    }
                }
                (descriptor.build)(settings)
            })
            .collect::<Result<Vec<_>, _>>()?,
        MechanismSelection::ConstantRate(lifetime) => {
            vec![ScatteringMechanism::Basic(Box::new(
                ConstantRelaxationTime::with_lifetime(settings, *lifetime),
            ))]
        }
    };

    tracing::info!(
        "Resolved scattering mechanisms: {}",
        mechanisms.iter().map(|mechanism| mechanism.name()).join(", ")
    );
    Ok(mechanisms)
}

#[cfg(test)]
mod test {
    use super::resolve_mechanisms;
    use crate::error::ConfigurationError;
    use crate::settings::{MaterialSettings, MechanismSelection};

    fn settings(selection: MechanismSelection, properties: &[(&str, f64)]) -> MaterialSettings {
        MaterialSettings {
            mechanisms: selection,
            nworkers: Some(1),
            cache_wavefunction: true,
            progress_bar: false,
            cache_memory_limit: None,
            rate_floor: 1e7,
            doping: vec![-1e24],
            temperatures: vec![300.0],
            fermi_levels: vec![vec![0.1]],
            properties: properties
                .iter()
                .map(|&(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    #[test]
    fn auto_selection_includes_only_buildable_mechanisms() {
        let settings = settings(
            MechanismSelection::Auto,
            &[
                ("deformation_potential", 8.6),
                ("elastic_constant", 139.7),
                ("static_dielectric", 12.9),
            ],
        );
        let mechanisms = resolve_mechanisms(&settings).unwrap();
        let names: Vec<_> = mechanisms.iter().map(|mechanism| mechanism.name()).collect();
        assert_eq!(names, vec!["ADP", "IMP"]);
    }

    #[test]
    fn auto_selection_with_no_properties_reports_no_mechanism() {
        let settings = settings(MechanismSelection::Auto, &[]);
        assert!(matches!(
            resolve_mechanisms(&settings),
            Err(ConfigurationError::NoMechanism)
        ));
    }

    #[test]
    fn explicit_selection_names_the_missing_property() {
        let settings = settings(
            MechanismSelection::Explicit(vec!["POP".into()]),
            &[("static_dielectric", 12.9)],
        );
        match resolve_mechanisms(&settings) {
            Err(ConfigurationError::MissingProperty {
                mechanism,
                property,
            }) => {
                assert_eq!(mechanism, "POP");
                assert_eq!(property, "pop_frequency");
            }
            Err(other) => panic!("expected MissingProperty, got {other:?}"),
            Ok(_) => panic!("expected MissingProperty, got a mechanism list"),
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        let settings = settings(MechanismSelection::Explicit(vec!["XYZ".into()]), &[]);
        assert!(matches!(
            resolve_mechanisms(&settings),
            Err(ConfigurationError::UnknownMechanism(name)) if name == "XYZ"
        ));
    }

    #[test]
    fn numeric_selection_builds_a_single_constant_rate_mechanism() {
        let settings = settings(MechanismSelection::ConstantRate(1e-14), &[]);
        let mechanisms = resolve_mechanisms(&settings).unwrap();
        assert_eq!(mechanisms.len(), 1);
        assert_eq!(mechanisms[0].name(), "CRT");
    }
}
